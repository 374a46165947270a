//! Character map construction.
//!
//! Builds a `cmap` table from `(char, glyph id)` pairs with up to two
//! subtables:
//!
//! - Format 4 for the Basic Multilingual Plane, referenced from
//!   (0, 3) Unicode BMP and (3, 1) Windows Unicode BMP.
//! - Format 12 for the full Unicode range, referenced from (0, 4) and
//!   (3, 10), emitted when a supplementary-plane character is mapped or the
//!   format 4 subtable would not fit in its 16-bit length field.

use super::sfnt::{pad_to_4, search_params};

/// Build a cmap table. Later duplicates of a character are ignored.
pub fn build_cmap(entries: &[(char, u16)]) -> Vec<u8> {
    let mut sorted: Vec<(u32, u16)> = entries.iter().map(|&(ch, gid)| (ch as u32, gid)).collect();
    sorted.sort_by_key(|&(code, _)| code);
    sorted.dedup_by_key(|&mut (code, _)| code);

    let bmp: Vec<(u16, u16)> = sorted
        .iter()
        .filter(|&&(code, _)| code < 0xFFFF)
        .map(|&(code, gid)| (code as u16, gid))
        .collect();
    let format4 = build_format4(&bmp);
    let needs_format12 = format4.is_none() || sorted.iter().any(|&(code, _)| code > 0xFFFF);
    let format12 = if needs_format12 { Some(build_format12(&sorted)) } else { None };

    // Encoding records sorted by (platformID, encodingID)
    let mut records: Vec<(u16, u16, usize)> = Vec::new(); // (platform, encoding, subtable index)
    if format4.is_some() {
        records.push((0, 3, 0));
    }
    if format12.is_some() {
        records.push((0, 4, 1));
    }
    if format4.is_some() {
        records.push((3, 1, 0));
    }
    if format12.is_some() {
        records.push((3, 10, 1));
    }

    let header_len = 4 + records.len() * 8;
    let mut body: Vec<u8> = Vec::new();
    let mut offsets = [0u32; 2];
    if let Some(sub) = &format4 {
        offsets[0] = (header_len + body.len()) as u32;
        body.extend_from_slice(sub);
        pad_to_4(&mut body);
    }
    if let Some(sub) = &format12 {
        offsets[1] = (header_len + body.len()) as u32;
        body.extend_from_slice(sub);
    }

    let mut cmap: Vec<u8> = Vec::with_capacity(header_len + body.len());
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&(records.len() as u16).to_be_bytes());
    for (platform, encoding, sub) in records {
        cmap.extend_from_slice(&platform.to_be_bytes());
        cmap.extend_from_slice(&encoding.to_be_bytes());
        cmap.extend_from_slice(&offsets[sub].to_be_bytes());
    }
    cmap.extend_from_slice(&body);
    cmap
}

/// A run of consecutive code points.
struct Segment {
    start: u16,
    end: u16,
    gids: Vec<u16>,
}

impl Segment {
    /// Glyph ids rise in step with the code points, so idDelta alone maps
    /// the whole run.
    fn is_linear(&self) -> bool {
        self.gids
            .iter()
            .enumerate()
            .all(|(i, &gid)| gid.wrapping_sub(self.gids[0]) as usize == i)
    }
}

/// Format 4 subtable, or `None` when it would exceed 65535 bytes.
fn build_format4(char_to_gid: &[(u16, u16)]) -> Option<Vec<u8>> {
    let mut segments: Vec<Segment> = Vec::new();
    for &(code, gid) in char_to_gid {
        if let Some(last) = segments.last_mut() {
            if code == last.end + 1 {
                last.end = code;
                last.gids.push(gid);
                continue;
            }
        }
        segments.push(Segment {
            start: code,
            end: code,
            gids: vec![gid],
        });
    }
    // Required final segment
    segments.push(Segment {
        start: 0xFFFF,
        end: 0xFFFF,
        gids: vec![0],
    });

    let array_len: usize = segments
        .iter()
        .filter(|s| s.start != 0xFFFF && !s.is_linear())
        .map(|s| s.gids.len())
        .sum();
    let subtable_len = 16 + segments.len() * 8 + array_len * 2;
    if subtable_len > u16::MAX as usize {
        return None;
    }

    let seg_count = segments.len() as u16;
    let (search_range, entry_selector, range_shift) = search_params(seg_count, 2);

    let mut glyph_id_array: Vec<u16> = Vec::with_capacity(array_len);
    let mut id_deltas: Vec<u16> = Vec::with_capacity(segments.len());
    let mut id_range_offsets: Vec<u16> = Vec::with_capacity(segments.len());

    for (i, seg) in segments.iter().enumerate() {
        if seg.start == 0xFFFF {
            id_deltas.push(1);
            id_range_offsets.push(0);
        } else if seg.is_linear() {
            id_deltas.push(seg.gids[0].wrapping_sub(seg.start));
            id_range_offsets.push(0);
        } else {
            // Offset from this idRangeOffset word to the segment's first glyph id
            id_deltas.push(0);
            let remaining = segments.len() - i;
            id_range_offsets.push(((remaining + glyph_id_array.len()) * 2) as u16);
            glyph_id_array.extend_from_slice(&seg.gids);
        }
    }

    let mut subtable: Vec<u8> = Vec::with_capacity(subtable_len);
    subtable.extend_from_slice(&4u16.to_be_bytes()); // format
    subtable.extend_from_slice(&(subtable_len as u16).to_be_bytes());
    subtable.extend_from_slice(&0u16.to_be_bytes()); // language
    subtable.extend_from_slice(&(seg_count * 2).to_be_bytes());
    subtable.extend_from_slice(&search_range.to_be_bytes());
    subtable.extend_from_slice(&entry_selector.to_be_bytes());
    subtable.extend_from_slice(&range_shift.to_be_bytes());
    for seg in &segments {
        subtable.extend_from_slice(&seg.end.to_be_bytes());
    }
    subtable.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for seg in &segments {
        subtable.extend_from_slice(&seg.start.to_be_bytes());
    }
    for d in &id_deltas {
        subtable.extend_from_slice(&d.to_be_bytes());
    }
    for r in &id_range_offsets {
        subtable.extend_from_slice(&r.to_be_bytes());
    }
    for g in &glyph_id_array {
        subtable.extend_from_slice(&g.to_be_bytes());
    }
    Some(subtable)
}

/// Format 12 subtable: groups of consecutive code points mapping to
/// consecutive glyph ids.
fn build_format12(char_to_gid: &[(u32, u16)]) -> Vec<u8> {
    let mut groups: Vec<(u32, u32, u32)> = Vec::new(); // (startChar, endChar, startGlyph)
    for &(code, gid) in char_to_gid {
        if let Some(last) = groups.last_mut() {
            if code == last.1 + 1 && gid as u32 == last.2 + (code - last.0) {
                last.1 = code;
                continue;
            }
        }
        groups.push((code, code, gid as u32));
    }

    let length = 16 + groups.len() * 12;
    let mut subtable: Vec<u8> = Vec::with_capacity(length);
    subtable.extend_from_slice(&12u16.to_be_bytes()); // format
    subtable.extend_from_slice(&0u16.to_be_bytes()); // reserved
    subtable.extend_from_slice(&(length as u32).to_be_bytes());
    subtable.extend_from_slice(&0u32.to_be_bytes()); // language
    subtable.extend_from_slice(&(groups.len() as u32).to_be_bytes());
    for (start, end, gid) in groups {
        subtable.extend_from_slice(&start.to_be_bytes());
        subtable.extend_from_slice(&end.to_be_bytes());
        subtable.extend_from_slice(&gid.to_be_bytes());
    }
    subtable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::sfnt::{read_u16, read_u32};

    /// Resolve a code point through a format 4 subtable the way a reader does.
    fn lookup_format4(sub: &[u8], code: u16) -> u16 {
        let seg_count = read_u16(sub, 6) as usize / 2;
        let ends = 14;
        let starts = ends + seg_count * 2 + 2;
        let deltas = starts + seg_count * 2;
        let ranges = deltas + seg_count * 2;
        for i in 0..seg_count {
            let end = read_u16(sub, ends + i * 2);
            if code > end {
                continue;
            }
            let start = read_u16(sub, starts + i * 2);
            if code < start {
                return 0;
            }
            let delta = read_u16(sub, deltas + i * 2);
            let range = read_u16(sub, ranges + i * 2) as usize;
            if range == 0 {
                return code.wrapping_add(delta);
            }
            let addr = ranges + i * 2 + range + (code - start) as usize * 2;
            return read_u16(sub, addr).wrapping_add(delta);
        }
        0
    }

    #[test]
    fn test_cmap_format4_single_char() {
        let cmap = build_cmap(&[('A', 1)]);

        assert_eq!(read_u16(&cmap, 0), 0); // version
        assert_eq!(read_u16(&cmap, 2), 2); // numTables
        assert_eq!(read_u16(&cmap, 4), 0); // Unicode
        assert_eq!(read_u16(&cmap, 6), 3); // BMP
        assert_eq!(read_u16(&cmap, 12), 3); // Windows
        assert_eq!(read_u16(&cmap, 14), 1); // Unicode BMP

        let offset = read_u32(&cmap, 8) as usize;
        assert_eq!(read_u32(&cmap, 16) as usize, offset);
        assert_eq!(read_u16(&cmap, offset), 4);
        assert_eq!(lookup_format4(&cmap[offset..], 'A' as u16), 1);
        assert_eq!(lookup_format4(&cmap[offset..], 'B' as u16), 0);
    }

    #[test]
    fn test_format4_linear_and_array_segments() {
        // A,B,C → 5,6,7 is linear; a,b → 9,3 needs the glyph id array
        let entries = [('A', 5), ('B', 6), ('C', 7), ('a', 9), ('b', 3), ('●', 12)];
        let cmap = build_cmap(&entries);
        let offset = read_u32(&cmap, 8) as usize;
        let sub = &cmap[offset..];
        for (ch, gid) in entries {
            assert_eq!(lookup_format4(sub, ch as u16), gid, "lookup of {:?}", ch);
        }
        assert_eq!(lookup_format4(sub, 'D' as u16), 0);
        // 4 segments: A-C, a-b, ●, 0xFFFF; array holds the two a-b glyphs
        assert_eq!(read_u16(sub, 6), 8);
        assert_eq!(read_u16(sub, 2) as usize, 16 + 4 * 8 + 2 * 2);
    }

    #[test]
    fn test_supplementary_adds_format12() {
        let cmap = build_cmap(&[('a', 1), ('𠀀', 2), ('𠀁', 3)]);
        assert_eq!(read_u16(&cmap, 2), 4);
        let platforms: Vec<(u16, u16)> = (0..4)
            .map(|i| (read_u16(&cmap, 4 + i * 8), read_u16(&cmap, 6 + i * 8)))
            .collect();
        assert_eq!(platforms, vec![(0, 3), (0, 4), (3, 1), (3, 10)]);

        let offset = read_u32(&cmap, 4 + 8 + 4) as usize;
        assert_eq!(offset % 4, 0);
        assert_eq!(read_u16(&cmap, offset), 12);
        // a → 1 and U+20000..U+20001 → 2..3 form two groups
        assert_eq!(read_u32(&cmap, offset + 12), 2);
        assert_eq!(read_u32(&cmap, offset + 16), 'a' as u32);
        assert_eq!(read_u32(&cmap, offset + 28), 0x20000);
        assert_eq!(read_u32(&cmap, offset + 32), 0x20001);
        assert_eq!(read_u32(&cmap, offset + 36), 2);
    }

    #[test]
    fn test_duplicate_chars_keep_first() {
        let cmap = build_cmap(&[('x', 4), ('x', 9)]);
        let offset = read_u32(&cmap, 8) as usize;
        assert_eq!(lookup_format4(&cmap[offset..], 'x' as u16), 4);
    }

    #[test]
    fn test_empty_cmap_has_sentinel_only() {
        let cmap = build_cmap(&[]);
        let offset = read_u32(&cmap, 8) as usize;
        assert_eq!(read_u16(&cmap, offset + 6), 2); // segCountX2
        assert_eq!(lookup_format4(&cmap[offset..], 'A' as u16), 0);
    }
}
