//! # Font Container
//!
//! A font is handled as a bag of named tables. Each table is an opaque byte
//! blob that is kept or dropped as a whole; only the subsetter looks inside.
//!
//! Three containers are read and written:
//!
//! ```text
//! sfnt  (TrueType / OpenType)   0x00010000 | 'true' | 'OTTO'
//! WOFF  1.0                     'wOFF'  zlib per table
//! WOFF2                         'wOF2'  one Brotli stream, null transforms
//! ```

pub mod cmap;
mod layout;
pub mod sfnt;
pub mod subset;
pub mod woff;
pub mod woff2;

pub use subset::{CharsetReducer, GlyfSubsetter};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// sfnt version of fonts with TrueType outlines.
pub const SFNT_VERSION_TRUETYPE: u32 = 0x0001_0000;
const SFNT_VERSION_APPLE: u32 = 0x7472_7565; // 'true'
const SFNT_VERSION_CFF: u32 = 0x4F54_544F; // 'OTTO'
const SIGNATURE_COLLECTION: u32 = 0x7474_6366; // 'ttcf'

/// A four-byte table tag such as `glyf` or `OS/2`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const GDEF: Tag = Tag(*b"GDEF");
    pub const GPOS: Tag = Tag(*b"GPOS");
    pub const GSUB: Tag = Tag(*b"GSUB");
    pub const CMAP: Tag = Tag(*b"cmap");
    pub const CVT: Tag = Tag(*b"cvt ");
    pub const FPGM: Tag = Tag(*b"fpgm");
    pub const GLYF: Tag = Tag(*b"glyf");
    pub const HEAD: Tag = Tag(*b"head");
    pub const HHEA: Tag = Tag(*b"hhea");
    pub const HMTX: Tag = Tag(*b"hmtx");
    pub const LOCA: Tag = Tag(*b"loca");
    pub const MAXP: Tag = Tag(*b"maxp");
    pub const NAME: Tag = Tag(*b"name");
    pub const POST: Tag = Tag(*b"post");
    pub const PREP: Tag = Tag(*b"prep");
    pub const OS2: Tag = Tag(*b"OS/2");

    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    pub const fn from_u32(value: u32) -> Self {
        Tag(value.to_be_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let ch = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{}", ch)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(\"{}\")", self)
    }
}

/// Tables needed to render a TrueType-outline font. Everything else is
/// dropped before subsetting.
pub const KEEP_TABLES: [Tag; 16] = [
    Tag::GDEF,
    Tag::GPOS,
    Tag::GSUB,
    Tag::CMAP,
    Tag::CVT,
    Tag::FPGM,
    Tag::GLYF,
    Tag::HEAD,
    Tag::HHEA,
    Tag::HMTX,
    Tag::LOCA,
    Tag::MAXP,
    Tag::NAME,
    Tag::POST,
    Tag::PREP,
    Tag::OS2,
];

/// Errors raised while reading, subsetting, or writing a font.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("font data is truncated")]
    TooShort,

    #[error("unrecognized font signature 0x{0:08X}")]
    UnknownFormat(u32),

    #[error("unsupported font: {0}")]
    Unsupported(String),

    #[error("table '{0}' lies outside the font data")]
    TableOutOfBounds(Tag),

    #[error("missing required table '{0}'")]
    MissingTable(Tag),

    #[error("malformed font: {0}")]
    Malformed(String),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
}

/// Container format for serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Plain TrueType/OpenType.
    Sfnt,
    /// WOFF 1.0.
    Woff,
    /// WOFF 2.0.
    #[default]
    Woff2,
}

/// A font as an sfnt version plus its tables, ordered by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    sfnt_version: u32,
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl Font {
    /// An empty font with the given sfnt version.
    pub fn new(sfnt_version: u32) -> Self {
        Font {
            sfnt_version,
            tables: BTreeMap::new(),
        }
    }

    /// Load a font from sfnt, WOFF, or WOFF2 bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FontError> {
        if data.len() < 4 {
            return Err(FontError::TooShort);
        }
        match sfnt::read_u32(data, 0) {
            SFNT_VERSION_TRUETYPE | SFNT_VERSION_APPLE | SFNT_VERSION_CFF => sfnt::parse(data),
            woff::SIGNATURE => woff::decode(data),
            woff2::SIGNATURE => woff2::decode(data),
            SIGNATURE_COLLECTION => Err(FontError::Unsupported(
                "font collections (.ttc) are not supported".to_string(),
            )),
            other => Err(FontError::UnknownFormat(other)),
        }
    }

    pub fn sfnt_version(&self) -> u32 {
        self.sfnt_version
    }

    pub fn table(&self, tag: Tag) -> Option<&[u8]> {
        self.tables.get(&tag).map(Vec::as_slice)
    }

    pub fn has_table(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    /// Insert or replace a table, returning the previous contents.
    pub fn insert_table(&mut self, tag: Tag, data: Vec<u8>) -> Option<Vec<u8>> {
        self.tables.insert(tag, data)
    }

    pub fn remove_table(&mut self, tag: Tag) -> Option<Vec<u8>> {
        self.tables.remove(&tag)
    }

    /// Table tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tables.keys().copied()
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = (Tag, &[u8])> {
        self.tables.iter().map(|(tag, data)| (*tag, data.as_slice()))
    }

    /// Drop every table not listed in `keep`. Returns the dropped tags.
    pub fn retain_tables(&mut self, keep: &[Tag]) -> Vec<Tag> {
        let dropped: Vec<Tag> = self
            .tables
            .keys()
            .filter(|tag| !keep.contains(tag))
            .copied()
            .collect();
        for tag in &dropped {
            self.tables.remove(tag);
        }
        dropped
    }

    /// Serialize as a plain sfnt file.
    pub fn to_sfnt(&self) -> Vec<u8> {
        sfnt::write(self)
    }

    pub fn to_woff(&self) -> Result<Vec<u8>, FontError> {
        woff::encode(self)
    }

    pub fn to_woff2(&self) -> Result<Vec<u8>, FontError> {
        woff2::encode(self)
    }

    /// Serialize in the requested container flavor.
    pub fn serialize(&self, flavor: Flavor) -> Result<Vec<u8>, FontError> {
        match flavor {
            Flavor::Sfnt => Ok(self.to_sfnt()),
            Flavor::Woff => self.to_woff(),
            Flavor::Woff2 => self.to_woff2(),
        }
    }
}

pub(crate) fn require_table(font: &Font, tag: Tag) -> Result<&[u8], FontError> {
    font.table(tag).ok_or(FontError::MissingTable(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_font() -> Font {
        let mut font = Font::new(SFNT_VERSION_TRUETYPE);
        font.insert_table(Tag::HEAD, vec![0; 54]);
        font.insert_table(Tag::new(b"FFTM"), vec![1, 2, 3, 4]);
        font.insert_table(Tag::new(b"DSIG"), vec![0; 8]);
        font.insert_table(Tag::CMAP, vec![0; 4]);
        font
    }

    #[test]
    fn test_tag_ordering_matches_u32() {
        assert!(Tag::OS2 < Tag::CMAP);
        assert!(Tag::OS2.to_u32() < Tag::CMAP.to_u32());
        assert_eq!(Tag::GLYF.to_u32(), 0x676C7966);
        assert_eq!(Tag::from_u32(0x68656164), Tag::HEAD);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::CVT.to_string(), "cvt ");
        assert_eq!(Tag::OS2.to_string(), "OS/2");
        assert_eq!(Tag([0, b'a', b'b', b'c']).to_string(), "?abc");
    }

    #[test]
    fn test_keep_list_is_exact() {
        let names: Vec<String> = KEEP_TABLES.iter().map(Tag::to_string).collect();
        assert_eq!(
            names,
            [
                "GDEF", "GPOS", "GSUB", "cmap", "cvt ", "fpgm", "glyf", "head", "hhea", "hmtx",
                "loca", "maxp", "name", "post", "prep", "OS/2"
            ]
        );
    }

    #[test]
    fn test_retain_tables_drops_unlisted() {
        let mut font = sample_font();
        let dropped = font.retain_tables(&KEEP_TABLES);
        assert_eq!(dropped, vec![Tag::new(b"DSIG"), Tag::new(b"FFTM")]);
        assert!(font.has_table(Tag::HEAD));
        assert!(font.has_table(Tag::CMAP));
        assert_eq!(font.num_tables(), 2);
    }

    #[test]
    fn test_from_bytes_rejects_unknown() {
        assert!(matches!(Font::from_bytes(b"abc"), Err(FontError::TooShort)));
        assert!(matches!(
            Font::from_bytes(b"PK\x03\x04rest"),
            Err(FontError::UnknownFormat(0x504B0304))
        ));
        assert!(matches!(
            Font::from_bytes(b"ttcf\0\0\0\0"),
            Err(FontError::Unsupported(_))
        ));
    }

    #[test]
    fn test_flavor_round_trips_through_bytes() {
        let font = sample_font();
        for flavor in [Flavor::Sfnt, Flavor::Woff, Flavor::Woff2] {
            let bytes = font.serialize(flavor).unwrap();
            let back = Font::from_bytes(&bytes).unwrap();
            assert_eq!(back.tags().collect::<Vec<_>>(), font.tags().collect::<Vec<_>>());
            assert_eq!(back.table(Tag::new(b"FFTM")), Some(&[1u8, 2, 3, 4][..]));
        }
    }

    #[test]
    fn test_flavor_deserialize() {
        let flavor: Flavor = serde_json::from_str("\"woff\"").unwrap();
        assert_eq!(flavor, Flavor::Woff);
        assert_eq!(Flavor::default(), Flavor::Woff2);
    }
}
