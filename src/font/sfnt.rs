//! sfnt table directory reading and writing, plus the big-endian byte
//! helpers shared by the other font modules.

use super::{Font, FontError, Tag};

const HEAD_CHECKSUM_ADJUSTMENT: usize = 8;
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

// ─── Reading ────────────────────────────────────────────────────

/// Parse an sfnt table directory into a [`Font`].
pub(crate) fn parse(data: &[u8]) -> Result<Font, FontError> {
    if data.len() < 12 {
        return Err(FontError::TooShort);
    }
    let num_tables = read_u16(data, 4) as usize;
    if 12 + num_tables * 16 > data.len() {
        return Err(FontError::TooShort);
    }

    let mut font = Font::new(read_u32(data, 0));
    for i in 0..num_tables {
        let record = 12 + i * 16;
        let tag = Tag::from_u32(read_u32(data, record));
        let offset = read_u32(data, record + 8) as usize;
        let length = read_u32(data, record + 12) as usize;
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or(FontError::TableOutOfBounds(tag))?;
        font.insert_table(tag, data[offset..end].to_vec());
    }
    Ok(font)
}

// ─── Writing ────────────────────────────────────────────────────

/// Write a font as an sfnt file: tables sorted by tag, each 4-byte aligned,
/// with directory checksums and the `head` checksum adjustment filled in.
pub(crate) fn write(font: &Font) -> Vec<u8> {
    let num_tables = font.num_tables() as u16;
    let (search_range, entry_selector, range_shift) = search_params(num_tables, 16);

    let mut output: Vec<u8> = Vec::new();
    output.extend_from_slice(&font.sfnt_version().to_be_bytes());
    output.extend_from_slice(&num_tables.to_be_bytes());
    output.extend_from_slice(&search_range.to_be_bytes());
    output.extend_from_slice(&entry_selector.to_be_bytes());
    output.extend_from_slice(&range_shift.to_be_bytes());

    // Directory with checksums left at zero until the data is laid out
    let mut table_offset = 12 + num_tables as usize * 16;
    let mut records: Vec<(Tag, usize, usize)> = Vec::new();
    for (tag, data) in font.tables() {
        output.extend_from_slice(&tag.to_u32().to_be_bytes());
        output.extend_from_slice(&0u32.to_be_bytes());
        output.extend_from_slice(&(table_offset as u32).to_be_bytes());
        output.extend_from_slice(&(data.len() as u32).to_be_bytes());
        records.push((tag, table_offset, data.len()));
        table_offset += padded_len(data.len());
    }

    for (_, data) in font.tables() {
        output.extend_from_slice(data);
        pad_to_4(&mut output);
    }

    // head is checksummed with its adjustment field zeroed
    let head = records.iter().find(|(tag, _, _)| *tag == Tag::HEAD).copied();
    if let Some((_, offset, length)) = head {
        if length >= HEAD_CHECKSUM_ADJUSTMENT + 4 {
            write_u32(&mut output, offset + HEAD_CHECKSUM_ADJUSTMENT, 0);
        }
    }

    for (i, (_, offset, length)) in records.iter().enumerate() {
        let checksum = calc_table_checksum(&output[*offset..*offset + padded_len(*length)]);
        write_u32(&mut output, 12 + i * 16 + 4, checksum);
    }

    if let Some((_, offset, length)) = head {
        if length >= HEAD_CHECKSUM_ADJUSTMENT + 4 {
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(calc_table_checksum(&output));
            write_u32(&mut output, offset + HEAD_CHECKSUM_ADJUSTMENT, adjustment);
        }
    }

    output
}

/// Binary-search header fields for `count` items of `unit` bytes:
/// `(searchRange, entrySelector, rangeShift)`.
pub(crate) fn search_params(count: u16, unit: u16) -> (u16, u16, u16) {
    if count == 0 {
        return (0, 0, 0);
    }
    let entry_selector = 15 - count.leading_zeros() as u16;
    let search_range = (1u16 << entry_selector).wrapping_mul(unit);
    let range_shift = count.wrapping_mul(unit).wrapping_sub(search_range);
    (search_range, entry_selector, range_shift)
}

pub(crate) fn calc_table_checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut last = [0u8; 4];
        last[..rest.len()].copy_from_slice(rest);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

pub(crate) fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

pub(crate) fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

// ─── Byte Helpers ───────────────────────────────────────────────

pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

pub(crate) fn write_u16(data: &mut [u8], offset: usize, val: u16) {
    data[offset..offset + 2].copy_from_slice(&val.to_be_bytes());
}

pub(crate) fn write_i16(data: &mut [u8], offset: usize, val: i16) {
    data[offset..offset + 2].copy_from_slice(&val.to_be_bytes());
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, val: u32) {
    data[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
}
