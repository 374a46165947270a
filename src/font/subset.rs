//! # TrueType Font Subsetter
//!
//! Strips a TrueType font down to the glyphs needed for a set of characters.
//! A CJK font with tens of thousands of glyphs is typically several
//! megabytes; a page that uses a few hundred characters needs a small
//! fraction of that.
//!
//! Glyph IDs are retained: glyphs that are not needed become empty instead
//! of being renumbered. Hinting programs stay valid as they are, and the
//! layout tables only need their glyph lists cut down.
//!
//! ## Approach
//!
//! 1. Map the requested characters to glyphs through the font's cmap
//! 2. Add every glyph GSUB can substitute in for them (ligatures, variants)
//! 3. Add the components of composite glyphs
//! 4. Rebuild glyf/loca with unneeded glyphs emptied
//! 5. Prune GDEF/GSUB/GPOS to the kept glyphs (see [`super::layout`])
//! 6. Rebuild cmap, and trim hmtx, post, name, OS/2 to match

use std::collections::BTreeSet;

use super::cmap::build_cmap;
use super::layout::{close_over_gsub, prune_layout_table};
use super::sfnt::{read_i16, read_u16, read_u32, write_i16, write_u16, write_u32};
use super::{require_table, Font, FontError, Tag};

/// Reduces a font to the glyphs needed for a character set.
pub trait CharsetReducer {
    /// Return `font` with glyph coverage restricted to `chars`, plus the
    /// glyphs those characters structurally depend on.
    fn reduce_to_charset(&self, font: Font, chars: &BTreeSet<char>) -> Result<Font, FontError>;
}

impl<R: CharsetReducer + ?Sized> CharsetReducer for &R {
    fn reduce_to_charset(&self, font: Font, chars: &BTreeSet<char>) -> Result<Font, FontError> {
        (**self).reduce_to_charset(font, chars)
    }
}

/// Subsetter for fonts with TrueType (`glyf`) outlines.
#[derive(Debug, Clone)]
pub struct GlyfSubsetter {
    /// Name IDs kept in the `name` table.
    pub name_ids: Vec<u16>,
    /// Keep the `post` glyph names instead of writing a format 3 table.
    pub glyph_names: bool,
}

impl Default for GlyfSubsetter {
    fn default() -> Self {
        GlyfSubsetter {
            name_ids: (0..=6).collect(),
            glyph_names: false,
        }
    }
}

/// Tables rebuilt by the subsetter.
struct Rebuilt {
    glyf: Vec<u8>,
    loca: Vec<u8>,
    head: Vec<u8>,
    hmtx: Vec<u8>,
    cmap: Vec<u8>,
    post: Option<Vec<u8>>,
    name: Option<Vec<u8>>,
    os2: Option<Vec<u8>>,
    layout: Vec<(Tag, Vec<u8>)>,
}

impl CharsetReducer for GlyfSubsetter {
    fn reduce_to_charset(&self, mut font: Font, chars: &BTreeSet<char>) -> Result<Font, FontError> {
        let rebuilt = self.rebuild(&font, chars)?;

        font.insert_table(Tag::GLYF, rebuilt.glyf);
        font.insert_table(Tag::LOCA, rebuilt.loca);
        font.insert_table(Tag::HEAD, rebuilt.head);
        font.insert_table(Tag::HMTX, rebuilt.hmtx);
        font.insert_table(Tag::CMAP, rebuilt.cmap);
        if let Some(post) = rebuilt.post {
            font.insert_table(Tag::POST, post);
        }
        if let Some(name) = rebuilt.name {
            font.insert_table(Tag::NAME, name);
        }
        if let Some(os2) = rebuilt.os2 {
            font.insert_table(Tag::OS2, os2);
        }
        for (tag, data) in rebuilt.layout {
            font.insert_table(tag, data);
        }
        Ok(font)
    }
}

impl GlyfSubsetter {
    fn rebuild(&self, font: &Font, chars: &BTreeSet<char>) -> Result<Rebuilt, FontError> {
        let sfnt = font.to_sfnt();
        let face = ttf_parser::Face::parse(&sfnt, 0)
            .map_err(|e| FontError::Malformed(format!("failed to parse font: {:?}", e)))?;
        let char_to_gid = map_chars(&face, chars);

        let head = require_table(font, Tag::HEAD)?;
        let maxp = require_table(font, Tag::MAXP)?;
        let hhea = require_table(font, Tag::HHEA)?;
        let hmtx = require_table(font, Tag::HMTX)?;
        let glyf = require_table(font, Tag::GLYF)?;
        let loca = require_table(font, Tag::LOCA)?;
        if head.len() < 54 || maxp.len() < 6 || hhea.len() < 36 {
            return Err(FontError::Malformed("head, maxp or hhea is truncated".to_string()));
        }

        let num_glyphs = read_u16(maxp, 4);
        let loca_format = read_i16(head, 50); // indexToLocFormat at offset 50
        let loca_offsets = parse_loca(loca, loca_format, num_glyphs)?;

        // Always include glyph 0 (.notdef)
        let mut needed: BTreeSet<u16> = BTreeSet::new();
        needed.insert(0);
        needed.extend(char_to_gid.iter().map(|&(_, gid)| gid));

        if let Some(gsub) = face.tables().gsub {
            let mapped = needed.len();
            close_over_gsub(&gsub, &mut needed);
            log::debug!("GSUB closure adds {} glyphs", needed.len() - mapped);
        }

        let initial: Vec<u16> = needed.iter().copied().collect();
        for gid in initial {
            collect_composite_deps(glyf, &loca_offsets, gid, &mut needed);
        }
        needed.retain(|&gid| gid < num_glyphs);

        let (new_glyf, new_offsets) = rebuild_glyf(glyf, &loca_offsets, &needed, num_glyphs);
        let new_loca_format: i16 = if new_glyf.len() > 0x1FFFE { 1 } else { 0 };
        let new_loca = build_loca(&new_offsets, new_loca_format);

        let num_h_metrics = read_u16(hhea, 34) as usize;
        let new_hmtx = strip_dropped_metrics(hmtx, &needed, num_h_metrics, num_glyphs);

        log::debug!(
            "subset keeps {} of {} glyphs, glyf {} -> {} bytes",
            needed.len(),
            num_glyphs,
            glyf.len(),
            new_glyf.len()
        );

        let post = match font.table(Tag::POST) {
            Some(post) if !self.glyph_names => Some(rebuild_post(post)),
            _ => None,
        };
        let name = match font.table(Tag::NAME) {
            Some(name) => Some(prune_names(name, &self.name_ids)?),
            None => None,
        };
        let os2 = font
            .table(Tag::OS2)
            .map(|os2| update_os2_char_range(os2, &char_to_gid));

        let mut layout = Vec::new();
        for tag in [Tag::GDEF, Tag::GSUB, Tag::GPOS] {
            let Some(data) = font.table(tag) else {
                continue;
            };
            match prune_layout_table(tag, data, &needed) {
                Ok(pruned) => {
                    log::debug!("{} pruned {} -> {} bytes", tag, data.len(), pruned.len());
                    layout.push((tag, pruned));
                }
                Err(e) => log::info!("keeping {} unpruned: {}", tag, e),
            }
        }

        Ok(Rebuilt {
            glyf: new_glyf,
            loca: new_loca,
            head: rebuild_head(head, new_loca_format),
            hmtx: new_hmtx,
            cmap: build_cmap(&char_to_gid),
            post,
            name,
            os2,
            layout,
        })
    }
}

/// Resolve characters through the font's own cmap. Unmapped characters are
/// skipped.
fn map_chars(face: &ttf_parser::Face<'_>, chars: &BTreeSet<char>) -> Vec<(char, u16)> {
    let mut char_to_gid = Vec::with_capacity(chars.len());
    let mut missing: Vec<char> = Vec::new();
    for &ch in chars {
        match face.glyph_index(ch) {
            Some(gid) if gid.0 != 0 => char_to_gid.push((ch, gid.0)),
            _ => missing.push(ch),
        }
    }

    let visible: Vec<char> = missing.into_iter().filter(|c| !c.is_control()).collect();
    if !visible.is_empty() {
        log::warn!(
            "{} requested characters have no glyph in the font: {}",
            visible.len(),
            visible.iter().take(32).collect::<String>()
        );
    }
    char_to_gid
}

// ─── Loca Table Parsing ─────────────────────────────────────────

fn parse_loca(data: &[u8], format: i16, num_glyphs: u16) -> Result<Vec<u32>, FontError> {
    let count = num_glyphs as usize + 1; // loca has numGlyphs + 1 entries
    let mut offsets = Vec::with_capacity(count);

    match format {
        0 => {
            // Short format: offsets are u16, multiply by 2
            for i in 0..count {
                let pos = i * 2;
                if pos + 2 > data.len() {
                    offsets.push(*offsets.last().unwrap_or(&0));
                } else {
                    offsets.push(read_u16(data, pos) as u32 * 2);
                }
            }
        }
        1 => {
            for i in 0..count {
                let pos = i * 4;
                if pos + 4 > data.len() {
                    offsets.push(*offsets.last().unwrap_or(&0));
                } else {
                    offsets.push(read_u32(data, pos));
                }
            }
        }
        other => {
            return Err(FontError::Malformed(format!(
                "unknown indexToLocFormat {}",
                other
            )))
        }
    }

    Ok(offsets)
}

// ─── Composite Glyph Dependency Collection ──────────────────────

const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

fn collect_composite_deps(glyf: &[u8], loca_offsets: &[u32], gid: u16, needed: &mut BTreeSet<u16>) {
    let idx = gid as usize;
    if idx + 1 >= loca_offsets.len() {
        return;
    }

    let start = loca_offsets[idx] as usize;
    let end = loca_offsets[idx + 1] as usize;
    if start >= end || start + 10 > glyf.len() {
        return;
    }

    let num_contours = read_i16(glyf, start);
    if num_contours >= 0 {
        return; // Simple glyph, no deps
    }

    let end = end.min(glyf.len());
    let mut pos = start + 10; // skip header (numContours + bbox)
    loop {
        if pos + 4 > end {
            break;
        }
        let flags = read_u16(glyf, pos);
        let component_gid = read_u16(glyf, pos + 2);
        pos += 4;

        if needed.insert(component_gid) {
            collect_composite_deps(glyf, loca_offsets, component_gid, needed);
        }

        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }

        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
}

// ─── Table Rebuilding ───────────────────────────────────────────

/// Copy needed glyphs, leave the rest empty. Returns the new glyf data and
/// `num_glyphs + 1` loca offsets.
fn rebuild_glyf(
    glyf: &[u8],
    loca_offsets: &[u32],
    needed: &BTreeSet<u16>,
    num_glyphs: u16,
) -> (Vec<u8>, Vec<u32>) {
    let mut new_glyf: Vec<u8> = Vec::new();
    let mut new_offsets: Vec<u32> = Vec::with_capacity(num_glyphs as usize + 1);

    for gid in 0..num_glyphs {
        new_offsets.push(new_glyf.len() as u32);
        if !needed.contains(&gid) {
            continue;
        }

        let idx = gid as usize;
        if idx + 1 >= loca_offsets.len() {
            continue;
        }
        let start = loca_offsets[idx] as usize;
        let end = (loca_offsets[idx + 1] as usize).min(glyf.len());
        if start >= end {
            continue;
        }

        new_glyf.extend_from_slice(&glyf[start..end]);
        // Pad to 4-byte boundary so short loca offsets stay even
        while new_glyf.len() % 4 != 0 {
            new_glyf.push(0);
        }
    }
    new_offsets.push(new_glyf.len() as u32);

    (new_glyf, new_offsets)
}

fn build_loca(offsets: &[u32], format: i16) -> Vec<u8> {
    let mut data = Vec::new();
    if format == 0 {
        for &offset in offsets {
            data.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
        }
    } else {
        for &offset in offsets {
            data.extend_from_slice(&offset.to_be_bytes());
        }
    }
    data
}

/// Zero the metrics of dropped glyphs so they compress away.
///
/// The advance of the last long metric applies to every glyph after it, so
/// that advance is never cleared.
fn strip_dropped_metrics(
    hmtx: &[u8],
    needed: &BTreeSet<u16>,
    num_h_metrics: usize,
    num_glyphs: u16,
) -> Vec<u8> {
    let mut data = hmtx.to_vec();

    for gid in 0..num_glyphs {
        if needed.contains(&gid) {
            continue;
        }
        let idx = gid as usize;
        let (start, end) = if idx < num_h_metrics {
            let offset = idx * 4;
            if idx + 1 == num_h_metrics {
                (offset + 2, offset + 4)
            } else {
                (offset, offset + 4)
            }
        } else {
            let offset = num_h_metrics * 4 + (idx - num_h_metrics) * 2;
            (offset, offset + 2)
        };
        if end <= data.len() {
            data[start..end].fill(0);
        }
    }

    data
}

fn rebuild_head(head: &[u8], new_loca_format: i16) -> Vec<u8> {
    let mut new_head = head.to_vec();
    // checkSumAdjustment is recomputed when the font is written
    write_u32(&mut new_head, 8, 0);
    write_i16(&mut new_head, 50, new_loca_format);
    new_head
}

/// Format 3.0 post: the original header metrics, no glyph names.
fn rebuild_post(post: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 32];
    let n = post.len().min(32);
    data[..n].copy_from_slice(&post[..n]);
    write_u32(&mut data, 0, 0x00030000);
    data
}

/// Keep only the name records whose name ID is listed. Format 1 tables
/// (with language tags) are returned unchanged.
fn prune_names(name: &[u8], keep_ids: &[u16]) -> Result<Vec<u8>, FontError> {
    if name.len() < 6 {
        return Err(FontError::Malformed("name table is truncated".to_string()));
    }
    if read_u16(name, 0) != 0 {
        return Ok(name.to_vec());
    }

    let count = read_u16(name, 2) as usize;
    let storage = read_u16(name, 4) as usize;
    if 6 + count * 12 > name.len() {
        return Err(FontError::Malformed("name records overrun the table".to_string()));
    }

    let mut kept: Vec<([u8; 8], &[u8])> = Vec::new(); // (platform/encoding/language/name ids, string)
    for i in 0..count {
        let record = 6 + i * 12;
        let name_id = read_u16(name, record + 6);
        if !keep_ids.contains(&name_id) {
            continue;
        }
        let length = read_u16(name, record + 8) as usize;
        let start = storage + read_u16(name, record + 10) as usize;
        if start + length > name.len() {
            continue;
        }
        let mut ids = [0u8; 8];
        ids.copy_from_slice(&name[record..record + 8]);
        kept.push((ids, &name[start..start + length]));
    }

    let string_offset = 6 + kept.len() * 12;
    let mut data: Vec<u8> = Vec::new();
    data.extend_from_slice(&0u16.to_be_bytes()); // format
    data.extend_from_slice(&(kept.len() as u16).to_be_bytes());
    data.extend_from_slice(&(string_offset as u16).to_be_bytes());

    let mut strings: Vec<u8> = Vec::new();
    for (ids, text) in &kept {
        data.extend_from_slice(ids);
        data.extend_from_slice(&(text.len() as u16).to_be_bytes());
        data.extend_from_slice(&(strings.len() as u16).to_be_bytes());
        strings.extend_from_slice(text);
    }
    data.extend_from_slice(&strings);
    Ok(data)
}

/// Set usFirstCharIndex / usLastCharIndex to the retained range.
fn update_os2_char_range(os2: &[u8], char_to_gid: &[(char, u16)]) -> Vec<u8> {
    let mut data = os2.to_vec();
    let first = char_to_gid.iter().map(|&(ch, _)| ch as u32).min();
    let last = char_to_gid.iter().map(|&(ch, _)| ch as u32).max();
    if let (Some(first), Some(last)) = (first, last) {
        if data.len() >= 68 {
            write_u16(&mut data, 64, first.min(0xFFFF) as u16);
            write_u16(&mut data, 66, last.min(0xFFFF) as u16);
        }
    }
    data
}

// ─── Tests ──────────────────────────────────────────────────────
