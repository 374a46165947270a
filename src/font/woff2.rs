//! # WOFF2
//!
//! All tables are concatenated into a single Brotli stream. Tables are
//! stored with null transforms: `glyf` and `loca` use transform version 3,
//! every other table version 0, so no `transformLength` is written.
//!
//! Decoding accepts the same subset: files whose `glyf`/`loca`/`hmtx`
//! carry the WOFF2 glyph transforms are rejected.

use std::io::{Read, Write};

use super::sfnt::{self, padded_len, read_u16, read_u32};
use super::{Font, FontError, Tag};

pub(crate) const SIGNATURE: u32 = 0x774F_4632; // 'wOF2'
const HEADER_LEN: usize = 48;
const ARBITRARY_TAG: u8 = 63;
const NULL_GLYF_TRANSFORM: u8 = 3;

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;

/// Tags with a one-byte encoding in the table directory, by index.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

fn known_tag_index(tag: Tag) -> Option<u8> {
    KNOWN_TAGS.iter().position(|t| **t == tag.0).map(|i| i as u8)
}

// ─── Encoding ───────────────────────────────────────────────────

pub(crate) fn encode(font: &Font) -> Result<Vec<u8>, FontError> {
    // Round-trip through sfnt so head carries its final checksum adjustment
    let font = sfnt::parse(&sfnt::write(font))?;

    let mut directory: Vec<u8> = Vec::new();
    let mut stream: Vec<u8> = Vec::new();
    let mut total_sfnt_size = 12 + 16 * font.num_tables();

    for (tag, data) in table_order(&font) {
        let mut flags = known_tag_index(tag).unwrap_or(ARBITRARY_TAG);
        if tag == Tag::GLYF || tag == Tag::LOCA {
            flags |= NULL_GLYF_TRANSFORM << 6;
        }
        directory.push(flags);
        if flags & 0x3F == ARBITRARY_TAG {
            directory.extend_from_slice(&tag.0);
        }
        write_base128(&mut directory, data.len() as u32);

        stream.extend_from_slice(data);
        total_sfnt_size += padded_len(data.len());
    }

    let compressed = compress(&stream)?;

    let length = padded_len(HEADER_LEN + directory.len() + compressed.len());
    let mut output: Vec<u8> = Vec::with_capacity(length);
    output.extend_from_slice(&SIGNATURE.to_be_bytes());
    output.extend_from_slice(&font.sfnt_version().to_be_bytes());
    output.extend_from_slice(&(length as u32).to_be_bytes());
    output.extend_from_slice(&(font.num_tables() as u16).to_be_bytes());
    output.extend_from_slice(&0u16.to_be_bytes()); // reserved
    output.extend_from_slice(&(total_sfnt_size as u32).to_be_bytes());
    output.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    output.extend_from_slice(&1u16.to_be_bytes()); // majorVersion
    output.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    output.extend_from_slice(&[0u8; 20]); // no metadata or private block
    output.extend_from_slice(&directory);
    output.extend_from_slice(&compressed);
    output.resize(length, 0);

    Ok(output)
}

/// Tag order, except that `loca` directly follows `glyf`.
fn table_order(font: &Font) -> Vec<(Tag, &[u8])> {
    let mut order: Vec<(Tag, &[u8])> = font.tables().filter(|(tag, _)| *tag != Tag::LOCA).collect();
    if let Some(loca) = font.table(Tag::LOCA) {
        let at = order
            .iter()
            .position(|(tag, _)| *tag == Tag::GLYF)
            .map(|i| i + 1)
            .unwrap_or(order.len());
        order.insert(at, (Tag::LOCA, loca));
    }
    order
}

fn compress(data: &[u8]) -> Result<Vec<u8>, FontError> {
    let mut writer =
        brotli::CompressorWriter::new(Vec::new(), BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
    writer.write_all(data).map_err(FontError::Compression)?;
    Ok(writer.into_inner())
}

/// UIntBase128: big-endian groups of 7 bits, high bit marks continuation.
fn write_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    loop {
        groups[len] = (value & 0x7F) as u8;
        value >>= 7;
        len += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

// ─── Decoding ───────────────────────────────────────────────────

pub(crate) fn decode(data: &[u8]) -> Result<Font, FontError> {
    if data.len() < HEADER_LEN {
        return Err(FontError::TooShort);
    }
    let flavor = read_u32(data, 4);
    let num_tables = read_u16(data, 12) as usize;
    let compressed_len = read_u32(data, 20) as usize;

    let mut pos = HEADER_LEN;
    let mut entries: Vec<(Tag, usize)> = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let flags = *data.get(pos).ok_or(FontError::TooShort)?;
        pos += 1;
        let index = flags & 0x3F;
        let tag = if index == ARBITRARY_TAG {
            let bytes = data.get(pos..pos + 4).ok_or(FontError::TooShort)?;
            pos += 4;
            Tag::from_u32(read_u32(bytes, 0))
        } else {
            Tag(*KNOWN_TAGS[index as usize])
        };
        let orig_length = read_base128(data, &mut pos)? as usize;

        let version = flags >> 6;
        let transformed = if tag == Tag::GLYF || tag == Tag::LOCA {
            version != NULL_GLYF_TRANSFORM
        } else {
            version != 0
        };
        if transformed {
            return Err(FontError::Unsupported(format!(
                "WOFF2 table '{}' uses transform version {}",
                tag, version
            )));
        }
        entries.push((tag, orig_length));
    }

    let compressed = data
        .get(pos..pos + compressed_len)
        .ok_or(FontError::TooShort)?;
    let mut stream = Vec::new();
    brotli::Decompressor::new(compressed, BROTLI_BUFFER)
        .read_to_end(&mut stream)
        .map_err(FontError::Compression)?;

    let mut font = Font::new(flavor);
    let mut offset = 0usize;
    for (tag, length) in entries {
        let table = stream
            .get(offset..offset + length)
            .ok_or(FontError::TableOutOfBounds(tag))?;
        font.insert_table(tag, table.to_vec());
        offset += length;
    }
    Ok(font)
}

fn read_base128(data: &[u8], pos: &mut usize) -> Result<u32, FontError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = *data.get(*pos).ok_or(FontError::TooShort)?;
        *pos += 1;
        if i == 0 && byte == 0x80 {
            return Err(FontError::Malformed("UIntBase128 with leading zeros".to_string()));
        }
        if value & 0xFE00_0000 != 0 {
            return Err(FontError::Malformed("UIntBase128 overflows u32".to_string()));
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(FontError::Malformed("UIntBase128 longer than 5 bytes".to_string()))
}
