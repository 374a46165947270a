//! WOFF 1.0: the sfnt tables, each zlib-compressed when that helps.

use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib;

use super::sfnt::{self, calc_table_checksum, pad_to_4, padded_len, read_u16, read_u32};
use super::{Font, FontError, Tag};

pub(crate) const SIGNATURE: u32 = 0x774F_4646; // 'wOFF'
const HEADER_LEN: usize = 44;
const ENTRY_LEN: usize = 20;
const ZLIB_LEVEL: u8 = 9;

pub(crate) fn encode(font: &Font) -> Result<Vec<u8>, FontError> {
    // Round-trip through sfnt so head carries its final checksum adjustment
    let font = sfnt::parse(&sfnt::write(font))?;
    let num_tables = font.num_tables();

    let mut total_sfnt_size = 12 + 16 * num_tables;
    let mut directory: Vec<u8> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let data_start = HEADER_LEN + ENTRY_LEN * num_tables;

    for (tag, data) in font.tables() {
        let compressed = compress_to_vec_zlib(data, ZLIB_LEVEL);
        let stored: &[u8] = if compressed.len() < data.len() { &compressed } else { data };

        directory.extend_from_slice(&tag.to_u32().to_be_bytes());
        directory.extend_from_slice(&((data_start + body.len()) as u32).to_be_bytes());
        directory.extend_from_slice(&(stored.len() as u32).to_be_bytes());
        directory.extend_from_slice(&(data.len() as u32).to_be_bytes());
        directory.extend_from_slice(&calc_table_checksum(data).to_be_bytes());

        body.extend_from_slice(stored);
        pad_to_4(&mut body);
        total_sfnt_size += padded_len(data.len());
    }

    let length = data_start + body.len();
    let mut output: Vec<u8> = Vec::with_capacity(length);
    output.extend_from_slice(&SIGNATURE.to_be_bytes());
    output.extend_from_slice(&font.sfnt_version().to_be_bytes());
    output.extend_from_slice(&(length as u32).to_be_bytes());
    output.extend_from_slice(&(num_tables as u16).to_be_bytes());
    output.extend_from_slice(&0u16.to_be_bytes()); // reserved
    output.extend_from_slice(&(total_sfnt_size as u32).to_be_bytes());
    output.extend_from_slice(&1u16.to_be_bytes()); // majorVersion
    output.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    output.extend_from_slice(&[0u8; 20]); // no metadata or private block
    output.extend_from_slice(&directory);
    output.extend_from_slice(&body);

    Ok(output)
}

pub(crate) fn decode(data: &[u8]) -> Result<Font, FontError> {
    if data.len() < HEADER_LEN {
        return Err(FontError::TooShort);
    }
    let flavor = read_u32(data, 4);
    let num_tables = read_u16(data, 12) as usize;
    if HEADER_LEN + num_tables * ENTRY_LEN > data.len() {
        return Err(FontError::TooShort);
    }

    let mut font = Font::new(flavor);
    for i in 0..num_tables {
        let entry = HEADER_LEN + i * ENTRY_LEN;
        let tag = Tag::from_u32(read_u32(data, entry));
        let offset = read_u32(data, entry + 4) as usize;
        let comp_length = read_u32(data, entry + 8) as usize;
        let orig_length = read_u32(data, entry + 12) as usize;

        let end = offset
            .checked_add(comp_length)
            .filter(|&end| end <= data.len())
            .ok_or(FontError::TableOutOfBounds(tag))?;
        let stored = &data[offset..end];

        let table = if comp_length < orig_length {
            let inflated = decompress_to_vec_zlib(stored).map_err(|e| {
                FontError::Malformed(format!("table '{}' failed to inflate: {:?}", tag, e))
            })?;
            if inflated.len() != orig_length {
                return Err(FontError::Malformed(format!(
                    "table '{}' inflated to {} bytes, expected {}",
                    tag,
                    inflated.len(),
                    orig_length
                )));
            }
            inflated
        } else if comp_length == orig_length {
            stored.to_vec()
        } else {
            return Err(FontError::Malformed(format!(
                "table '{}' is larger compressed than uncompressed",
                tag
            )));
        };
        font.insert_table(tag, table);
    }
    Ok(font)
}
