//! A small synthetic TrueType font for the subsetting tests.
//!
//! ```text
//! gid 0  .notdef   simple
//! gid 1  'A'       simple
//! gid 2  'B'       simple
//! gid 3  'C'       composite → gid 1
//! gid 4  '●'       simple
//! gid 5  (none)    simple      ligature A + B
//! gid 6  '中'      simple
//! gid 7  (none)    composite → gid 2, single substitution of '●'
//! ```
//!
//! GSUB has one `liga` feature calling both substitutions. GPOS kerns A
//! against B and against 中. GDEF classes 1, 2 and 6 as base glyphs and 5
//! as a ligature. `post` is format 2 with names for glyphs 4 to 7.
//!
//! Besides the keep-list tables it carries an `FFTM` table that the
//! pre-filter must drop.

#![allow(dead_code)]

use glyphtrim::font::cmap::build_cmap;
use glyphtrim::font::{Font, Tag, SFNT_VERSION_TRUETYPE};

pub const NUM_GLYPHS: u16 = 8;
pub const CHAR_MAP: [(char, u16); 5] = [('A', 1), ('B', 2), ('C', 3), ('●', 4), ('中', 6)];
pub const LIGATURE_AB: u16 = 5;
pub const BULLET_ALT: u16 = 7;
pub const POST_NAMES: [&str; 4] = ["uni25CF", "A_B", "uni4E2D", "uni25CF.alt"];

pub fn fftm() -> Tag {
    Tag::new(b"FFTM")
}

/// One contour, one on-curve point at (size, size).
fn simple_glyph(size: i16) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&1i16.to_be_bytes()); // numberOfContours
    for v in [0, 0, size, size] {
        data.extend_from_slice(&v.to_be_bytes()); // bbox
    }
    data.extend_from_slice(&0u16.to_be_bytes()); // endPtsOfContours[0]
    data.extend_from_slice(&0u16.to_be_bytes()); // instructionLength
    data.push(0x01); // on curve, 16-bit coordinates
    data.extend_from_slice(&size.to_be_bytes());
    data.extend_from_slice(&size.to_be_bytes());
    data.push(0);
    data
}

fn composite_glyph(component: u16) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(-1i16).to_be_bytes());
    data.extend_from_slice(&[0u8; 8]);
    data.extend_from_slice(&0x0003u16.to_be_bytes()); // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES
    data.extend_from_slice(&component.to_be_bytes());
    data.extend_from_slice(&10i16.to_be_bytes());
    data.extend_from_slice(&0i16.to_be_bytes());
    data
}

fn head() -> Vec<u8> {
    let mut data = vec![0u8; 54];
    data[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes()); // version
    data[4..8].copy_from_slice(&0x0001_0000u32.to_be_bytes()); // fontRevision
    data[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes()); // magicNumber
    data[18..20].copy_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    data[40..42].copy_from_slice(&1000i16.to_be_bytes()); // xMax
    data[42..44].copy_from_slice(&1000i16.to_be_bytes()); // yMax
    data[50..52].copy_from_slice(&0i16.to_be_bytes()); // indexToLocFormat
    data
}

fn hhea() -> Vec<u8> {
    let mut data = vec![0u8; 36];
    data[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    data[4..6].copy_from_slice(&800i16.to_be_bytes()); // ascender
    data[6..8].copy_from_slice(&(-200i16).to_be_bytes()); // descender
    data[10..12].copy_from_slice(&1000u16.to_be_bytes()); // advanceWidthMax
    data[34..36].copy_from_slice(&NUM_GLYPHS.to_be_bytes()); // numberOfHMetrics
    data
}

fn maxp() -> Vec<u8> {
    let mut data = vec![0u8; 32];
    data[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    data[4..6].copy_from_slice(&NUM_GLYPHS.to_be_bytes());
    data[6..8].copy_from_slice(&16u16.to_be_bytes()); // maxPoints
    data[8..10].copy_from_slice(&4u16.to_be_bytes()); // maxContours
    data[14..16].copy_from_slice(&2u16.to_be_bytes()); // maxZones
    data
}

fn hmtx() -> Vec<u8> {
    let mut data = Vec::new();
    for gid in 0..NUM_GLYPHS {
        data.extend_from_slice(&(500 + gid * 50).to_be_bytes());
        data.extend_from_slice(&10i16.to_be_bytes());
    }
    data
}

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Format 2: standard names for .notdef, A, B, C and custom ones after.
fn post() -> Vec<u8> {
    let mut data = vec![0u8; 32];
    data[0..4].copy_from_slice(&0x0002_0000u32.to_be_bytes());
    data[8..10].copy_from_slice(&(-100i16).to_be_bytes()); // underlinePosition
    data[10..12].copy_from_slice(&50i16.to_be_bytes()); // underlineThickness
    data.extend(words(&[NUM_GLYPHS, 0, 36, 37, 38, 258, 259, 260, 261]));
    for name in POST_NAMES {
        data.push(name.len() as u8);
        data.extend_from_slice(name.as_bytes());
    }
    data
}

/// Script list with DFLT whose default language system uses feature 0.
fn script_list() -> Vec<u16> {
    vec![
        1, 0x4446, 0x4C54, 8, // DFLT -> script at 8
        4, 0, // default LangSys at 4, no others
        0, 0xFFFF, 1, 0, // LangSys: feature 0
    ]
}

/// `liga`: lookup 0 is the ligature A + B -> 5, lookup 1 substitutes
/// 7 for ●.
pub fn gsub() -> Vec<u8> {
    let mut table = vec![1, 0, 10, 30, 46];
    table.extend(script_list()); // @10
    table.extend([1, 0x6C69, 0x6761, 8, 0, 2, 0, 1]); // @30 FeatureList, Feature @38
    table.extend([2, 6, 38]); // @46 LookupList
    table.extend([4, 0, 1, 8]); // @52 ligature lookup
    table.extend([1, 8, 1, 14, 1, 1, 1, 1, 4, LIGATURE_AB, 2, 2]); // @60
    table.extend([1, 0, 1, 8]); // @84 single substitution lookup
    table.extend([2, 8, 1, BULLET_ALT, 1, 1, 4]); // @92
    words(&table)
}

/// `kern`: one pair adjustment, A against B (-50) and 中 (-30).
pub fn gpos() -> Vec<u8> {
    let mut table = vec![1, 0, 10, 30, 44];
    table.extend(script_list()); // @10
    table.extend([1, 0x6B65, 0x726E, 8, 0, 1, 0]); // @30 FeatureList, Feature @38
    table.extend([1, 4]); // @44 LookupList
    table.extend([2, 0, 1, 8]); // @48 pair lookup
    table.extend([1, 12, 0x0004, 0, 1, 18, 1, 1, 1]); // @56 format 1, coverage {A}
    table.extend([2, 2, (-50i16) as u16, 6, (-30i16) as u16]); // @74 PairSet
    words(&table)
}

/// Glyph classes: 1-2 base, 5 ligature, 6 base.
pub fn gdef() -> Vec<u8> {
    words(&[1, 0, 12, 0, 0, 0, 2, 3, 1, 2, 1, 5, 5, 2, 6, 6, 1])
}

/// nameID 1 "Test" and nameID 13 "License text".
fn name() -> Vec<u8> {
    let family: Vec<u8> = "Test".encode_utf16().flat_map(|c| c.to_be_bytes()).collect();
    let license: Vec<u8> = "License text"
        .encode_utf16()
        .flat_map(|c| c.to_be_bytes())
        .collect();

    let mut data = Vec::new();
    data.extend_from_slice(&0u16.to_be_bytes()); // format
    data.extend_from_slice(&2u16.to_be_bytes()); // count
    data.extend_from_slice(&30u16.to_be_bytes()); // stringOffset
    for (name_id, len, offset) in [
        (1u16, family.len(), 0usize),
        (13u16, license.len(), family.len()),
    ] {
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0x0409u16.to_be_bytes());
        data.extend_from_slice(&name_id.to_be_bytes());
        data.extend_from_slice(&(len as u16).to_be_bytes());
        data.extend_from_slice(&(offset as u16).to_be_bytes());
    }
    data.extend_from_slice(&family);
    data.extend_from_slice(&license);
    data
}

fn os2() -> Vec<u8> {
    let mut data = vec![0u8; 96];
    data[0..2].copy_from_slice(&4u16.to_be_bytes()); // version
    data[4..6].copy_from_slice(&400u16.to_be_bytes()); // usWeightClass
    data[6..8].copy_from_slice(&5u16.to_be_bytes()); // usWidthClass
    data[64..66].copy_from_slice(&0x0041u16.to_be_bytes()); // usFirstCharIndex
    data[66..68].copy_from_slice(&0x4E2Du16.to_be_bytes()); // usLastCharIndex
    data
}

/// The fixture as a [`Font`].
pub fn test_font() -> Font {
    let glyphs = vec![
        simple_glyph(500),
        simple_glyph(600),
        simple_glyph(700),
        composite_glyph(1),
        simple_glyph(800),
        simple_glyph(900),
        simple_glyph(1000),
        composite_glyph(2),
    ];

    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    for glyph in &glyphs {
        loca.extend_from_slice(&((glyf.len() / 2) as u16).to_be_bytes());
        glyf.extend_from_slice(glyph);
        while glyf.len() % 4 != 0 {
            glyf.push(0);
        }
    }
    loca.extend_from_slice(&((glyf.len() / 2) as u16).to_be_bytes());

    let mut font = Font::new(SFNT_VERSION_TRUETYPE);
    font.insert_table(Tag::HEAD, head());
    font.insert_table(Tag::HHEA, hhea());
    font.insert_table(Tag::MAXP, maxp());
    font.insert_table(Tag::HMTX, hmtx());
    font.insert_table(Tag::GLYF, glyf);
    font.insert_table(Tag::LOCA, loca);
    font.insert_table(Tag::CMAP, build_cmap(&CHAR_MAP));
    font.insert_table(Tag::POST, post());
    font.insert_table(Tag::NAME, name());
    font.insert_table(Tag::OS2, os2());
    font.insert_table(Tag::GSUB, gsub());
    font.insert_table(Tag::GPOS, gpos());
    font.insert_table(Tag::GDEF, gdef());
    font.insert_table(fftm(), vec![0x46; 28]);
    font
}

/// The fixture serialized as a TrueType file.
pub fn test_font_bytes() -> Vec<u8> {
    test_font().to_sfnt()
}

/// Glyph `gid`'s byte range length according to a short-format loca table.
pub fn glyph_len(loca: &[u8], gid: usize) -> usize {
    let at = |i: usize| u16::from_be_bytes([loca[i * 2], loca[i * 2 + 1]]) as usize * 2;
    at(gid + 1) - at(gid)
}
