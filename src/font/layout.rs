//! # OpenType Layout Tables
//!
//! Two jobs on GSUB, GPOS and GDEF once the glyph set is known:
//!
//! - **Closure.** A substitution can turn requested characters into glyphs
//!   no cmap entry points at (ligatures, contextual forms, localized
//!   variants). Those glyphs are added to the kept set until nothing new
//!   turns up.
//! - **Pruning.** Every coverage, class definition and per-glyph record is
//!   cut down to the kept glyphs. Subtables with nothing left are dropped,
//!   lookups without subtables are removed and every lookup index (features
//!   and nested lookup records) is renumbered to match.
//!
//! Glyph IDs are retained, so nothing is renumbered except lookups.
//!
//! Pruned tables are rebuilt as a tree of [`Table`] nodes and packed
//! depth-first. If a 16-bit offset overflows, the lookups are packed again
//! as extension lookups whose subtables sit behind 32-bit offsets.
//! Structures this module does not understand (feature variations, item
//! variation stores, unknown lookup types) make pruning fail; the caller
//! keeps the table as it was.

use std::collections::{BTreeMap, BTreeSet};

use ttf_parser::gsub::{SingleSubstitution, SubstitutionSubtable};
use ttf_parser::opentype_layout::{Coverage, LayoutTable};
use ttf_parser::GlyphId;

use super::{FontError, Tag};

// ─── Substitution Closure ───────────────────────────────────────

/// Add every glyph a substitution can produce from `glyphs`, repeating
/// until the set stops growing.
///
/// All lookups take part, whether or not a feature references them.
/// Contextual lookups produce nothing themselves; the lookups they call
/// are visited on their own.
pub(crate) fn close_over_gsub(gsub: &LayoutTable<'_>, glyphs: &mut BTreeSet<u16>) {
    loop {
        let before = glyphs.len();
        for i in 0..gsub.lookups.len() {
            let Some(lookup) = gsub.lookups.get(i) else {
                continue;
            };
            for j in 0..lookup.subtables.len() {
                if let Some(subtable) = lookup.subtables.get::<SubstitutionSubtable>(j) {
                    let produced = substitution_outputs(&subtable, glyphs);
                    glyphs.extend(produced);
                }
            }
        }
        if glyphs.len() == before {
            break;
        }
    }
}

fn substitution_outputs(subtable: &SubstitutionSubtable<'_>, glyphs: &BTreeSet<u16>) -> Vec<u16> {
    let mut out = Vec::new();
    let covered = |coverage: Coverage<'_>| -> Vec<(u16, u16)> {
        glyphs
            .iter()
            .filter_map(|&g| coverage.get(GlyphId(g)).map(|index| (g, index)))
            .collect()
    };

    match subtable {
        SubstitutionSubtable::Single(SingleSubstitution::Format1 { coverage, delta }) => {
            for (g, _) in covered(*coverage) {
                out.push(g.wrapping_add(*delta as u16));
            }
        }
        SubstitutionSubtable::Single(SingleSubstitution::Format2 { coverage, substitutes }) => {
            for (_, index) in covered(*coverage) {
                out.extend(substitutes.get(index).map(|g| g.0));
            }
        }
        SubstitutionSubtable::Multiple(table) => {
            for (_, index) in covered(table.coverage) {
                if let Some(sequence) = table.sequences.get(index) {
                    out.extend(sequence.substitutes.into_iter().map(|g| g.0));
                }
            }
        }
        SubstitutionSubtable::Alternate(table) => {
            for (_, index) in covered(table.coverage) {
                if let Some(set) = table.alternate_sets.get(index) {
                    out.extend(set.alternates.into_iter().map(|g| g.0));
                }
            }
        }
        SubstitutionSubtable::Ligature(table) => {
            for (_, index) in covered(table.coverage) {
                let Some(set) = table.ligature_sets.get(index) else {
                    continue;
                };
                for k in 0..set.len() {
                    let Some(ligature) = set.get(k) else {
                        continue;
                    };
                    if ligature.components.into_iter().all(|c| glyphs.contains(&c.0)) {
                        out.push(ligature.glyph.0);
                    }
                }
            }
        }
        SubstitutionSubtable::ReverseChainSingle(table) => {
            for (_, index) in covered(table.coverage) {
                out.extend(table.substitutes.get(index).map(|g| g.0));
            }
        }
        SubstitutionSubtable::Context(_) | SubstitutionSubtable::ChainContext(_) => {}
    }
    out
}

// ─── Table Tree ─────────────────────────────────────────────────

/// A table under construction: its own bytes plus the child tables its
/// offset fields point at.
#[derive(Debug, Clone, Default)]
struct Table {
    bytes: Vec<u8>,
    links: Vec<Link>,
}

#[derive(Debug, Clone)]
struct Link {
    /// Position of the offset field within the parent's bytes.
    at: usize,
    wide: bool,
    child: Table,
}

impl Table {
    fn from_bytes(bytes: &[u8]) -> Self {
        Table {
            bytes: bytes.to_vec(),
            links: Vec::new(),
        }
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn link(&mut self, child: Table) {
        let at = self.bytes.len();
        self.u16(0);
        self.links.push(Link {
            at,
            wide: false,
            child,
        });
    }

    fn link_wide(&mut self, child: Table) {
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&0u32.to_be_bytes());
        self.links.push(Link {
            at,
            wide: true,
            child,
        });
    }

    /// A null offset when there is no child.
    fn link_opt(&mut self, child: Option<Table>) {
        match child {
            Some(child) => self.link(child),
            None => self.u16(0),
        }
    }
}

/// Serialize a table tree. 16-bit children follow their parent directly;
/// 32-bit children are appended after everything else.
fn pack(root: &Table) -> Result<Vec<u8>, FontError> {
    let mut out = Vec::new();
    let mut deferred: Vec<(usize, usize, &Table)> = Vec::new();
    write_table(&mut out, root, &mut deferred)?;

    let mut next = 0;
    while next < deferred.len() {
        let (base, field, child) = deferred[next];
        next += 1;
        let pos = out.len();
        write_table(&mut out, child, &mut deferred)?;
        let offset = u32::try_from(pos - base)
            .map_err(|_| FontError::Malformed("layout table exceeds 4 GiB".to_string()))?;
        out[field..field + 4].copy_from_slice(&offset.to_be_bytes());
    }
    Ok(out)
}

fn write_table<'t>(
    out: &mut Vec<u8>,
    table: &'t Table,
    deferred: &mut Vec<(usize, usize, &'t Table)>,
) -> Result<(), FontError> {
    let start = out.len();
    out.extend_from_slice(&table.bytes);
    for link in &table.links {
        let field = start + link.at;
        if link.wide {
            deferred.push((start, field, &link.child));
            continue;
        }
        let pos = out.len();
        write_table(out, &link.child, deferred)?;
        let offset = u16::try_from(pos - start)
            .map_err(|_| FontError::Malformed("16-bit layout offset overflow".to_string()))?;
        out[field..field + 2].copy_from_slice(&offset.to_be_bytes());
    }
    Ok(())
}

// ─── Coverage and Class Definitions ─────────────────────────────

/// Runs of consecutive glyph IDs in a sorted list.
fn glyph_ranges(glyphs: &[u16]) -> Vec<(u16, u16)> {
    let mut ranges: Vec<(u16, u16)> = Vec::new();
    for &g in glyphs {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(g) => *end = g,
            _ => ranges.push((g, g)),
        }
    }
    ranges
}

/// Coverage over sorted glyphs, in whichever format is smaller.
fn coverage_table(glyphs: &[u16]) -> Table {
    let ranges = glyph_ranges(glyphs);
    let mut t = Table::default();
    if ranges.len() * 6 < glyphs.len() * 2 {
        t.u16(2);
        t.u16(ranges.len() as u16);
        let mut index = 0u32;
        for (start, end) in ranges {
            t.u16(start);
            t.u16(end);
            t.u16(index as u16);
            index += u32::from(end - start) + 1;
        }
    } else {
        t.u16(1);
        t.u16(glyphs.len() as u16);
        for &g in glyphs {
            t.u16(g);
        }
    }
    t
}

/// Class definition over `(glyph, class)` pairs sorted by glyph. Class 0
/// entries are left out.
fn class_def_table(entries: &[(u16, u16)]) -> Table {
    let entries: Vec<(u16, u16)> = entries.iter().copied().filter(|&(_, c)| c != 0).collect();

    let mut ranges: Vec<(u16, u16, u16)> = Vec::new();
    for &(g, class) in &entries {
        match ranges.last_mut() {
            Some((_, end, c)) if *c == class && end.checked_add(1) == Some(g) => *end = g,
            _ => ranges.push((g, g, class)),
        }
    }

    let mut t = Table::default();
    match (entries.first(), entries.last()) {
        (Some(&(first, _)), Some(&(last, _)))
            if 6 + 2 * (usize::from(last - first) + 1) < 4 + 6 * ranges.len() =>
        {
            let classes: BTreeMap<u16, u16> = entries.iter().copied().collect();
            t.u16(1);
            t.u16(first);
            t.u16(last - first + 1);
            for g in first..=last {
                t.u16(classes.get(&g).copied().unwrap_or(0));
            }
        }
        _ => {
            t.u16(2);
            t.u16(ranges.len() as u16);
            for (start, end, class) in ranges {
                t.u16(start);
                t.u16(end);
                t.u16(class);
            }
        }
    }
    t
}

// ─── Pruning ────────────────────────────────────────────────────

/// Prune a GSUB, GPOS or GDEF table to `kept`. Errors leave the decision
/// to keep the original bytes with the caller.
pub(crate) fn prune_layout_table(
    tag: Tag,
    data: &[u8],
    kept: &BTreeSet<u16>,
) -> Result<Vec<u8>, FontError> {
    let mut pruner = Pruner {
        data,
        kept,
        lookup_map: None,
    };
    match tag {
        Tag::GSUB => pruner.lookup_table(LayoutKind::Substitution),
        Tag::GPOS => pruner.lookup_table(LayoutKind::Positioning),
        Tag::GDEF => pack(&pruner.gdef()?),
        other => Err(FontError::Unsupported(format!(
            "'{}' is not a layout table",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutKind {
    Substitution,
    Positioning,
}

impl LayoutKind {
    fn extension_type(self) -> u16 {
        match self {
            LayoutKind::Substitution => 7,
            LayoutKind::Positioning => 9,
        }
    }
}

/// A lookup whose subtables survived pruning.
#[derive(Debug, Clone)]
struct Lookup {
    lookup_type: u16,
    flag: u16,
    mark_filtering_set: Option<u16>,
    subtables: Vec<Table>,
}

const USE_MARK_FILTERING_SET: u16 = 0x0010;

struct Pruner<'a> {
    data: &'a [u8],
    kept: &'a BTreeSet<u16>,
    /// Old lookup index to new one; `None` before the surviving lookups are
    /// known.
    lookup_map: Option<Vec<Option<u16>>>,
}

fn truncated() -> FontError {
    FontError::Malformed("layout table is truncated".to_string())
}

fn unsupported(what: &str, value: u16) -> FontError {
    FontError::Unsupported(format!("{} {}", what, value))
}

impl<'a> Pruner<'a> {
    // ─── Reading ────────────────────────────────────────────────

    fn u16_at(&self, pos: usize) -> Result<u16, FontError> {
        self.data
            .get(pos..pos + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(truncated)
    }

    fn u32_at(&self, pos: usize) -> Result<u32, FontError> {
        self.data
            .get(pos..pos + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(truncated)
    }

    fn bytes(&self, pos: usize, len: usize) -> Result<&'a [u8], FontError> {
        self.data.get(pos..pos + len).ok_or_else(truncated)
    }

    fn u16_array(&self, pos: usize, count: usize) -> Result<Vec<u16>, FontError> {
        (0..count).map(|i| self.u16_at(pos + i * 2)).collect()
    }

    /// The 16-bit offset at `field`, resolved against `base`.
    fn offset(&self, base: usize, field: usize) -> Result<Option<usize>, FontError> {
        let offset = self.u16_at(field)?;
        Ok((offset != 0).then(|| base + usize::from(offset)))
    }

    fn required(&self, base: usize, field: usize) -> Result<usize, FontError> {
        self.offset(base, field)?
            .ok_or_else(|| FontError::Malformed("null offset in layout table".to_string()))
    }

    /// Glyphs of the coverage table at `at`, in coverage index order.
    fn coverage(&self, at: usize) -> Result<Vec<u16>, FontError> {
        let count = usize::from(self.u16_at(at + 2)?);
        match self.u16_at(at)? {
            1 => self.u16_array(at + 4, count),
            2 => {
                let mut glyphs = Vec::new();
                for i in 0..count {
                    let record = at + 4 + i * 6;
                    let start = self.u16_at(record)?;
                    let end = self.u16_at(record + 2)?;
                    if start > end {
                        return Err(FontError::Malformed("inverted coverage range".to_string()));
                    }
                    glyphs.extend(start..=end);
                }
                Ok(glyphs)
            }
            format => Err(unsupported("coverage format", format)),
        }
    }

    /// Kept glyphs of a coverage table with their original coverage index.
    fn kept_coverage(&self, at: usize) -> Result<Vec<(u16, usize)>, FontError> {
        Ok(self
            .coverage(at)?
            .into_iter()
            .enumerate()
            .filter(|(_, g)| self.kept.contains(g))
            .map(|(index, g)| (g, index))
            .collect())
    }

    fn kept_glyphs(&self, at: usize) -> Result<Vec<u16>, FontError> {
        Ok(self.kept_coverage(at)?.into_iter().map(|(g, _)| g).collect())
    }

    /// `(glyph, class)` pairs of kept glyphs with a nonzero class, sorted by
    /// glyph.
    fn kept_classes(&self, at: usize) -> Result<Vec<(u16, u16)>, FontError> {
        let mut entries = Vec::new();
        match self.u16_at(at)? {
            1 => {
                let start = self.u16_at(at + 2)?;
                let count = usize::from(self.u16_at(at + 4)?);
                for (i, class) in self.u16_array(at + 6, count)?.into_iter().enumerate() {
                    let g = usize::from(start) + i;
                    if g <= usize::from(u16::MAX) {
                        entries.push((g as u16, class));
                    }
                }
            }
            2 => {
                let count = usize::from(self.u16_at(at + 2)?);
                for i in 0..count {
                    let record = at + 4 + i * 6;
                    let start = self.u16_at(record)?;
                    let end = self.u16_at(record + 2)?;
                    let class = self.u16_at(record + 4)?;
                    if start > end {
                        continue;
                    }
                    entries.extend(self.kept.range(start..=end).map(|&g| (g, class)));
                }
            }
            format => return Err(unsupported("class definition format", format)),
        }
        entries.retain(|(g, class)| *class != 0 && self.kept.contains(g));
        entries.sort_unstable();
        entries.dedup_by_key(|(g, _)| *g);
        Ok(entries)
    }

    /// Sequence lookup records, renumbered. Records that call a removed
    /// lookup are dropped.
    fn lookup_records(&self, at: usize, count: usize) -> Result<Vec<(u16, u16)>, FontError> {
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let sequence_index = self.u16_at(at + i * 4)?;
            let lookup_index = self.u16_at(at + i * 4 + 2)?;
            match &self.lookup_map {
                None => records.push((sequence_index, lookup_index)),
                Some(map) => {
                    if let Some(Some(new)) = map.get(usize::from(lookup_index)) {
                        records.push((sequence_index, *new));
                    }
                }
            }
        }
        Ok(records)
    }

    fn device(&self, at: usize) -> Result<Table, FontError> {
        let start = self.u16_at(at)?;
        let end = self.u16_at(at + 2)?;
        let len = match self.u16_at(at + 4)? {
            format @ 1..=3 => {
                let count = usize::from(end.saturating_sub(start)) + 1;
                let per_word = 16usize >> format;
                6 + 2 * ((count + per_word - 1) / per_word)
            }
            // VariationIndex
            _ => 6,
        };
        Ok(Table::from_bytes(self.bytes(at, len)?))
    }

    fn anchor(&self, at: usize) -> Result<Table, FontError> {
        match self.u16_at(at)? {
            1 => Ok(Table::from_bytes(self.bytes(at, 6)?)),
            2 => Ok(Table::from_bytes(self.bytes(at, 8)?)),
            3 => {
                let mut t = Table::from_bytes(self.bytes(at, 6)?);
                for field in [at + 6, at + 8] {
                    let device = self.offset(at, field)?.map(|d| self.device(d)).transpose()?;
                    t.link_opt(device);
                }
                Ok(t)
            }
            format => Err(unsupported("anchor format", format)),
        }
    }

    /// Copy the anchor behind the offset at `field` into `t`.
    fn anchor_field(&self, t: &mut Table, base: usize, field: usize) -> Result<(), FontError> {
        let anchor = self.offset(base, field)?.map(|a| self.anchor(a)).transpose()?;
        t.link_opt(anchor);
        Ok(())
    }

    /// Copy a value record into `t`. Device offsets are relative to `base`,
    /// which must be the table `t` is rebuilding.
    fn value_record(&self, t: &mut Table, base: usize, at: usize, format: u16) -> Result<(), FontError> {
        let mut pos = at;
        for bit in 0..8 {
            if format & (1 << bit) == 0 {
                continue;
            }
            if bit < 4 {
                t.u16(self.u16_at(pos)?);
            } else {
                let device = self.offset(base, pos)?.map(|d| self.device(d)).transpose()?;
                t.link_opt(device);
            }
            pos += 2;
        }
        Ok(())
    }

    // ─── GSUB / GPOS ────────────────────────────────────────────

    fn lookup_table(&mut self, kind: LayoutKind) -> Result<Vec<u8>, FontError> {
        let major = self.u16_at(0)?;
        let minor = self.u16_at(2)?;
        if major != 1 {
            return Err(unsupported("layout table major version", major));
        }
        if minor >= 1 && self.u32_at(10)? != 0 {
            return Err(FontError::Unsupported("feature variations".to_string()));
        }
        let scripts_at = self.required(0, 4)?;
        let features_at = self.required(0, 6)?;
        let lookups_at = self.required(0, 8)?;
        let count = usize::from(self.u16_at(lookups_at)?);

        // Which lookups survive decides the numbering the second pass uses.
        let mut map = Vec::with_capacity(count);
        let mut next = 0u16;
        for i in 0..count {
            let at = self.required(lookups_at, lookups_at + 2 + i * 2)?;
            if self.lookup(kind, at)?.is_some() {
                map.push(Some(next));
                next += 1;
            } else {
                map.push(None);
            }
        }
        self.lookup_map = Some(map);

        let mut lookups = Vec::with_capacity(usize::from(next));
        for i in 0..count {
            let at = self.required(lookups_at, lookups_at + 2 + i * 2)?;
            if let Some(lookup) = self.lookup(kind, at)? {
                lookups.push(lookup);
            }
        }

        let scripts = self.script_list(scripts_at)?;
        let features = self.feature_list(features_at)?;
        log::debug!(
            "layout table keeps {} of {} lookups",
            lookups.len(),
            count
        );

        let build = |extension: bool| {
            let mut root = Table::default();
            root.u16(1);
            root.u16(0);
            root.link(scripts.clone());
            root.link(features.clone());
            root.link(lookup_list_table(&lookups, kind, extension));
            root
        };
        match pack(&build(false)) {
            Ok(bytes) => Ok(bytes),
            Err(_) => {
                log::debug!("lookup offsets overflow, packing as extension lookups");
                pack(&build(true))
            }
        }
    }

    fn script_list(&self, at: usize) -> Result<Table, FontError> {
        let count = usize::from(self.u16_at(at)?);
        let mut t = Table::default();
        t.u16(count as u16);
        for i in 0..count {
            let record = at + 2 + i * 6;
            t.raw(self.bytes(record, 4)?);
            t.link(self.script(self.required(at, record + 4)?)?);
        }
        Ok(t)
    }

    fn script(&self, at: usize) -> Result<Table, FontError> {
        let mut t = Table::default();
        let default = self.offset(at, at)?.map(|d| self.lang_sys(d)).transpose()?;
        t.link_opt(default);
        let count = usize::from(self.u16_at(at + 2)?);
        t.u16(count as u16);
        for i in 0..count {
            let record = at + 4 + i * 6;
            t.raw(self.bytes(record, 4)?);
            t.link(self.lang_sys(self.required(at, record + 4)?)?);
        }
        Ok(t)
    }

    fn lang_sys(&self, at: usize) -> Result<Table, FontError> {
        let count = usize::from(self.u16_at(at + 4)?);
        Ok(Table::from_bytes(self.bytes(at, 6 + count * 2)?))
    }

    fn feature_list(&self, at: usize) -> Result<Table, FontError> {
        let count = usize::from(self.u16_at(at)?);
        let mut t = Table::default();
        t.u16(count as u16);
        for i in 0..count {
            let record = at + 2 + i * 6;
            let tag = self.bytes(record, 4)?;
            t.raw(tag);
            t.link(self.feature(self.required(at, record + 4)?, tag)?);
        }
        Ok(t)
    }

    fn feature(&self, at: usize, tag: &[u8]) -> Result<Table, FontError> {
        let mut t = Table::default();
        let params = self
            .offset(at, at)?
            .map(|p| self.feature_params(p, tag))
            .transpose()?;
        t.link_opt(params);

        let count = usize::from(self.u16_at(at + 2)?);
        let indices: Vec<u16> = self
            .u16_array(at + 4, count)?
            .into_iter()
            .filter_map(|index| match &self.lookup_map {
                None => Some(index),
                Some(map) => map.get(usize::from(index)).copied().flatten(),
            })
            .collect();
        t.u16(indices.len() as u16);
        for index in indices {
            t.u16(index);
        }
        Ok(t)
    }

    fn feature_params(&self, at: usize, tag: &[u8]) -> Result<Table, FontError> {
        let len = match tag {
            b"size" => 10,
            [b's', b's', ..] => 4,
            [b'c', b'v', ..] => 14 + 3 * usize::from(self.u16_at(at + 12)?),
            _ => {
                return Err(FontError::Unsupported(format!(
                    "feature parameters for '{}'",
                    String::from_utf8_lossy(tag)
                )))
            }
        };
        Ok(Table::from_bytes(self.bytes(at, len)?))
    }

    /// The lookup at `at` with its pruned subtables, or `None` when no
    /// subtable survives.
    fn lookup(&self, kind: LayoutKind, at: usize) -> Result<Option<Lookup>, FontError> {
        let mut lookup_type = self.u16_at(at)?;
        let flag = self.u16_at(at + 2)?;
        let count = usize::from(self.u16_at(at + 4)?);

        let mut subtables = Vec::new();
        for i in 0..count {
            let mut sub_at = self.required(at, at + 6 + i * 2)?;
            if self.u16_at(at)? == kind.extension_type() {
                let format = self.u16_at(sub_at)?;
                if format != 1 {
                    return Err(unsupported("extension format", format));
                }
                lookup_type = self.u16_at(sub_at + 2)?;
                sub_at += self.u32_at(sub_at + 4)? as usize;
            }
            if let Some(subtable) = self.subtable(kind, lookup_type, sub_at)? {
                subtables.push(subtable);
            }
        }
        if subtables.is_empty() {
            return Ok(None);
        }

        let mark_filtering_set = if flag & USE_MARK_FILTERING_SET != 0 {
            Some(self.u16_at(at + 6 + count * 2)?)
        } else {
            None
        };
        Ok(Some(Lookup {
            lookup_type,
            flag,
            mark_filtering_set,
            subtables,
        }))
    }

    fn subtable(&self, kind: LayoutKind, lookup_type: u16, at: usize) -> Result<Option<Table>, FontError> {
        use LayoutKind::{Positioning, Substitution};
        match (kind, lookup_type) {
            (Substitution, 1) => self.single_substitution(at),
            // Multiple and alternate substitution share one layout
            (Substitution, 2) | (Substitution, 3) => self.sequence_substitution(at),
            (Substitution, 4) => self.ligature_substitution(at),
            (Substitution, 5) | (Positioning, 7) => self.context(at),
            (Substitution, 6) | (Positioning, 8) => self.chain_context(at),
            (Substitution, 8) => self.reverse_chain(at),
            (Positioning, 1) => self.single_positioning(at),
            (Positioning, 2) => self.pair_positioning(at),
            (Positioning, 3) => self.cursive_positioning(at),
            // Mark-to-base and mark-to-mark share one layout
            (Positioning, 4) | (Positioning, 6) => self.mark_attachment(at),
            (Positioning, 5) => self.mark_to_ligature(at),
            (_, other) => Err(unsupported("lookup type", other)),
        }
    }

    // ─── Substitution Subtables ─────────────────────────────────

    fn single_substitution(&self, at: usize) -> Result<Option<Table>, FontError> {
        let covered = self.kept_coverage(self.required(at, at + 2)?)?;
        if covered.is_empty() {
            return Ok(None);
        }
        let glyphs: Vec<u16> = covered.iter().map(|&(g, _)| g).collect();

        let mut t = Table::default();
        match self.u16_at(at)? {
            1 => {
                t.u16(1);
                t.link(coverage_table(&glyphs));
                t.u16(self.u16_at(at + 4)?); // deltaGlyphID
            }
            2 => {
                let count = usize::from(self.u16_at(at + 4)?);
                t.u16(2);
                t.link(coverage_table(&glyphs));
                t.u16(glyphs.len() as u16);
                for &(_, index) in &covered {
                    if index >= count {
                        return Err(truncated());
                    }
                    t.u16(self.u16_at(at + 6 + index * 2)?);
                }
            }
            format => return Err(unsupported("single substitution format", format)),
        }
        Ok(Some(t))
    }

    fn sequence_substitution(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("sequence substitution format", format));
        }
        let count = usize::from(self.u16_at(at + 4)?);

        let mut glyphs = Vec::new();
        let mut sets = Vec::new();
        for (g, index) in self.kept_coverage(self.required(at, at + 2)?)? {
            if index >= count {
                continue;
            }
            let set_at = self.required(at, at + 6 + index * 2)?;
            let len = usize::from(self.u16_at(set_at)?);
            glyphs.push(g);
            sets.push(Table::from_bytes(self.bytes(set_at, 2 + len * 2)?));
        }
        if glyphs.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&glyphs));
        t.u16(sets.len() as u16);
        for set in sets {
            t.link(set);
        }
        Ok(Some(t))
    }

    fn ligature_substitution(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("ligature substitution format", format));
        }
        let count = usize::from(self.u16_at(at + 4)?);

        let mut glyphs = Vec::new();
        let mut sets = Vec::new();
        for (g, index) in self.kept_coverage(self.required(at, at + 2)?)? {
            if index >= count {
                continue;
            }
            let set_at = self.required(at, at + 6 + index * 2)?;
            let ligature_count = usize::from(self.u16_at(set_at)?);

            let mut ligatures = Vec::new();
            for k in 0..ligature_count {
                let lig_at = self.required(set_at, set_at + 2 + k * 2)?;
                let ligature_glyph = self.u16_at(lig_at)?;
                let component_count = usize::from(self.u16_at(lig_at + 2)?);
                if component_count == 0 {
                    return Err(FontError::Malformed("ligature without components".to_string()));
                }
                let components = self.u16_array(lig_at + 4, component_count - 1)?;
                if self.kept.contains(&ligature_glyph) && components.iter().all(|c| self.kept.contains(c)) {
                    ligatures.push(Table::from_bytes(self.bytes(lig_at, 2 + component_count * 2)?));
                }
            }
            if ligatures.is_empty() {
                continue;
            }

            let mut set = Table::default();
            set.u16(ligatures.len() as u16);
            for ligature in ligatures {
                set.link(ligature);
            }
            glyphs.push(g);
            sets.push(set);
        }
        if glyphs.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&glyphs));
        t.u16(sets.len() as u16);
        for set in sets {
            t.link(set);
        }
        Ok(Some(t))
    }

    fn reverse_chain(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("reverse chaining substitution format", format));
        }
        let covered = self.kept_coverage(self.required(at, at + 2)?)?;
        if covered.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.u16(1);
        let glyphs: Vec<u16> = covered.iter().map(|&(g, _)| g).collect();
        t.link(coverage_table(&glyphs));

        let mut pos = at + 4;
        for _ in 0..2 {
            let count = usize::from(self.u16_at(pos)?);
            t.u16(count as u16);
            for k in 0..count {
                let context = self.kept_glyphs(self.required(at, pos + 2 + k * 2)?)?;
                if context.is_empty() {
                    return Ok(None);
                }
                t.link(coverage_table(&context));
            }
            pos += 2 + count * 2;
        }

        let count = usize::from(self.u16_at(pos)?);
        t.u16(covered.len() as u16);
        for &(_, index) in &covered {
            if index >= count {
                return Err(truncated());
            }
            t.u16(self.u16_at(pos + 2 + index * 2)?);
        }
        Ok(Some(t))
    }

    // ─── Contextual Subtables ───────────────────────────────────

    fn context(&self, at: usize) -> Result<Option<Table>, FontError> {
        match self.u16_at(at)? {
            1 => self.glyph_rule_sets(at, false),
            2 => {
                let glyphs = self.kept_glyphs(self.required(at, at + 2)?)?;
                if glyphs.is_empty() {
                    return Ok(None);
                }
                let classes = self.kept_classes(self.required(at, at + 4)?)?;
                let live = live_classes(Some(&classes));
                let count = usize::from(self.u16_at(at + 6)?);

                let mut t = Table::default();
                t.u16(2);
                t.link(coverage_table(&glyphs));
                t.link(class_def_table(&classes));
                t.u16(count as u16);
                for class in 0..count {
                    let set = match self.offset(at, at + 8 + class * 2)? {
                        Some(set_at) if live.contains(&(class as u16)) => self
                            .rule_set(set_at, |rule_at| {
                                self.context_rule(rule_at, |value| live.contains(&value))
                            })?,
                        _ => None,
                    };
                    t.link_opt(set);
                }
                Ok(Some(t))
            }
            3 => {
                let glyph_count = usize::from(self.u16_at(at + 2)?);
                let lookup_count = usize::from(self.u16_at(at + 4)?);
                let mut coverages = Vec::with_capacity(glyph_count);
                for k in 0..glyph_count {
                    let glyphs = self.kept_glyphs(self.required(at, at + 6 + k * 2)?)?;
                    if glyphs.is_empty() {
                        return Ok(None);
                    }
                    coverages.push(coverage_table(&glyphs));
                }
                let records = self.lookup_records(at + 6 + glyph_count * 2, lookup_count)?;

                let mut t = Table::default();
                t.u16(3);
                t.u16(glyph_count as u16);
                t.u16(records.len() as u16);
                for coverage in coverages {
                    t.link(coverage);
                }
                push_records(&mut t, &records);
                Ok(Some(t))
            }
            format => Err(unsupported("context format", format)),
        }
    }

    fn chain_context(&self, at: usize) -> Result<Option<Table>, FontError> {
        match self.u16_at(at)? {
            1 => self.glyph_rule_sets(at, true),
            2 => {
                let glyphs = self.kept_glyphs(self.required(at, at + 2)?)?;
                if glyphs.is_empty() {
                    return Ok(None);
                }
                let mut class_defs = Vec::with_capacity(3);
                for field in [at + 4, at + 6, at + 8] {
                    let classes = self.offset(at, field)?.map(|c| self.kept_classes(c)).transpose()?;
                    class_defs.push(classes);
                }
                let live: Vec<BTreeSet<u16>> =
                    class_defs.iter().map(|c| live_classes(c.as_deref())).collect();
                let count = usize::from(self.u16_at(at + 10)?);

                let mut t = Table::default();
                t.u16(2);
                t.link(coverage_table(&glyphs));
                for classes in &class_defs {
                    t.link_opt(classes.as_deref().map(class_def_table));
                }
                t.u16(count as u16);
                for class in 0..count {
                    let set = match self.offset(at, at + 12 + class * 2)? {
                        Some(set_at) if live[1].contains(&(class as u16)) => self
                            .rule_set(set_at, |rule_at| {
                                self.chain_rule(rule_at, |seq, value| live[seq].contains(&value))
                            })?,
                        _ => None,
                    };
                    t.link_opt(set);
                }
                Ok(Some(t))
            }
            3 => {
                let mut t = Table::default();
                t.u16(3);
                let mut pos = at + 2;
                for _ in 0..3 {
                    let count = usize::from(self.u16_at(pos)?);
                    t.u16(count as u16);
                    for k in 0..count {
                        let glyphs = self.kept_glyphs(self.required(at, pos + 2 + k * 2)?)?;
                        if glyphs.is_empty() {
                            return Ok(None);
                        }
                        t.link(coverage_table(&glyphs));
                    }
                    pos += 2 + count * 2;
                }
                let lookup_count = usize::from(self.u16_at(pos)?);
                let records = self.lookup_records(pos + 2, lookup_count)?;
                t.u16(records.len() as u16);
                push_records(&mut t, &records);
                Ok(Some(t))
            }
            format => Err(unsupported("chained context format", format)),
        }
    }

    /// Format 1 of both contextual lookups: rule sets indexed by coverage.
    fn glyph_rule_sets(&self, at: usize, chained: bool) -> Result<Option<Table>, FontError> {
        let count = usize::from(self.u16_at(at + 4)?);
        let kept = |value: u16| self.kept.contains(&value);

        let mut glyphs = Vec::new();
        let mut sets = Vec::new();
        for (g, index) in self.kept_coverage(self.required(at, at + 2)?)? {
            if index >= count {
                continue;
            }
            let Some(set_at) = self.offset(at, at + 6 + index * 2)? else {
                continue;
            };
            let set = if chained {
                self.rule_set(set_at, |rule_at| self.chain_rule(rule_at, |_, value| kept(value)))?
            } else {
                self.rule_set(set_at, |rule_at| self.context_rule(rule_at, kept))?
            };
            if let Some(set) = set {
                glyphs.push(g);
                sets.push(set);
            }
        }
        if glyphs.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&glyphs));
        t.u16(sets.len() as u16);
        for set in sets {
            t.link(set);
        }
        Ok(Some(t))
    }

    fn rule_set<F>(&self, at: usize, mut rule: F) -> Result<Option<Table>, FontError>
    where
        F: FnMut(usize) -> Result<Option<Table>, FontError>,
    {
        let count = usize::from(self.u16_at(at)?);
        let mut rules = Vec::new();
        for k in 0..count {
            if let Some(kept) = rule(self.required(at, at + 2 + k * 2)?)? {
                rules.push(kept);
            }
        }
        if rules.is_empty() {
            return Ok(None);
        }
        let mut t = Table::default();
        t.u16(rules.len() as u16);
        for kept in rules {
            t.link(kept);
        }
        Ok(Some(t))
    }

    /// A context rule, kept only if every input value is still live.
    fn context_rule<F>(&self, at: usize, live: F) -> Result<Option<Table>, FontError>
    where
        F: Fn(u16) -> bool,
    {
        let glyph_count = usize::from(self.u16_at(at)?);
        let lookup_count = usize::from(self.u16_at(at + 2)?);
        if glyph_count == 0 {
            return Err(FontError::Malformed("empty context rule".to_string()));
        }
        let input = self.u16_array(at + 4, glyph_count - 1)?;
        if !input.iter().all(|&value| live(value)) {
            return Ok(None);
        }
        let records = self.lookup_records(at + 4 + (glyph_count - 1) * 2, lookup_count)?;

        let mut t = Table::default();
        t.u16(glyph_count as u16);
        t.u16(records.len() as u16);
        for value in input {
            t.u16(value);
        }
        push_records(&mut t, &records);
        Ok(Some(t))
    }

    /// A chained rule: backtrack (0), input (1) and lookahead (2) sequences.
    fn chain_rule<F>(&self, at: usize, live: F) -> Result<Option<Table>, FontError>
    where
        F: Fn(usize, u16) -> bool,
    {
        let mut t = Table::default();
        let mut pos = at;
        for seq in 0..3 {
            let count = usize::from(self.u16_at(pos)?);
            // The input sequence starts at its second glyph
            let stored = if seq == 1 {
                count
                    .checked_sub(1)
                    .ok_or_else(|| FontError::Malformed("empty chained input".to_string()))?
            } else {
                count
            };
            let values = self.u16_array(pos + 2, stored)?;
            if !values.iter().all(|&value| live(seq, value)) {
                return Ok(None);
            }
            t.u16(count as u16);
            for value in values {
                t.u16(value);
            }
            pos += 2 + stored * 2;
        }
        let lookup_count = usize::from(self.u16_at(pos)?);
        let records = self.lookup_records(pos + 2, lookup_count)?;
        t.u16(records.len() as u16);
        push_records(&mut t, &records);
        Ok(Some(t))
    }

    // ─── Positioning Subtables ──────────────────────────────────

    fn single_positioning(&self, at: usize) -> Result<Option<Table>, FontError> {
        let covered = self.kept_coverage(self.required(at, at + 2)?)?;
        if covered.is_empty() {
            return Ok(None);
        }
        let glyphs: Vec<u16> = covered.iter().map(|&(g, _)| g).collect();
        let value_format = self.u16_at(at + 4)?;
        let len = value_record_len(value_format);

        let mut t = Table::default();
        match self.u16_at(at)? {
            1 => {
                t.u16(1);
                t.link(coverage_table(&glyphs));
                t.u16(value_format);
                self.value_record(&mut t, at, at + 6, value_format)?;
            }
            2 => {
                let count = usize::from(self.u16_at(at + 6)?);
                t.u16(2);
                t.link(coverage_table(&glyphs));
                t.u16(value_format);
                t.u16(covered.len() as u16);
                for &(_, index) in &covered {
                    if index >= count {
                        return Err(truncated());
                    }
                    self.value_record(&mut t, at, at + 8 + index * len, value_format)?;
                }
            }
            format => return Err(unsupported("single positioning format", format)),
        }
        Ok(Some(t))
    }

    fn pair_positioning(&self, at: usize) -> Result<Option<Table>, FontError> {
        let covered = self.kept_coverage(self.required(at, at + 2)?)?;
        if covered.is_empty() {
            return Ok(None);
        }
        let format1 = self.u16_at(at + 4)?;
        let format2 = self.u16_at(at + 6)?;
        let len1 = value_record_len(format1);
        let len2 = value_record_len(format2);

        match self.u16_at(at)? {
            1 => {
                let count = usize::from(self.u16_at(at + 8)?);
                let record_len = 2 + len1 + len2;

                let mut glyphs = Vec::new();
                let mut sets = Vec::new();
                for (g, index) in covered {
                    if index >= count {
                        continue;
                    }
                    let set_at = self.required(at, at + 10 + index * 2)?;
                    let pair_count = usize::from(self.u16_at(set_at)?);
                    let mut pairs = Vec::new();
                    for k in 0..pair_count {
                        let record = set_at + 2 + k * record_len;
                        if self.kept.contains(&self.u16_at(record)?) {
                            pairs.push(record);
                        }
                    }
                    if pairs.is_empty() {
                        continue;
                    }

                    let mut set = Table::default();
                    set.u16(pairs.len() as u16);
                    for record in pairs {
                        set.u16(self.u16_at(record)?);
                        self.value_record(&mut set, set_at, record + 2, format1)?;
                        self.value_record(&mut set, set_at, record + 2 + len1, format2)?;
                    }
                    glyphs.push(g);
                    sets.push(set);
                }
                if glyphs.is_empty() {
                    return Ok(None);
                }

                let mut t = Table::default();
                t.u16(1);
                t.link(coverage_table(&glyphs));
                t.u16(format1);
                t.u16(format2);
                t.u16(sets.len() as u16);
                for set in sets {
                    t.link(set);
                }
                Ok(Some(t))
            }
            2 => {
                let glyphs: Vec<u16> = covered.iter().map(|&(g, _)| g).collect();
                let first = self.kept_classes(self.required(at, at + 8)?)?;
                let second = self.kept_classes(self.required(at, at + 10)?)?;
                let class1_count = usize::from(self.u16_at(at + 12)?);
                let class2_count = usize::from(self.u16_at(at + 14)?);

                // Only the classes of covered first glyphs have rows worth keeping
                let first: Vec<(u16, u16)> = first
                    .into_iter()
                    .filter(|(g, _)| glyphs.binary_search(g).is_ok())
                    .collect();
                let rows = compact_classes(&first, class1_count)?;
                let cols = compact_classes(&second, class2_count)?;

                let mut t = Table::default();
                t.u16(2);
                t.link(coverage_table(&glyphs));
                t.u16(format1);
                t.u16(format2);
                t.link(class_def_table(&renumber(&first, &rows)));
                t.link(class_def_table(&renumber(&second, &cols)));
                t.u16(rows.len() as u16);
                t.u16(cols.len() as u16);
                let record_len = len1 + len2;
                for &row in &rows {
                    for &col in &cols {
                        let record = at
                            + 16
                            + (usize::from(row) * class2_count + usize::from(col)) * record_len;
                        self.value_record(&mut t, at, record, format1)?;
                        self.value_record(&mut t, at, record + len1, format2)?;
                    }
                }
                Ok(Some(t))
            }
            format => Err(unsupported("pair positioning format", format)),
        }
    }

    fn cursive_positioning(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("cursive positioning format", format));
        }
        let covered = self.kept_coverage(self.required(at, at + 2)?)?;
        if covered.is_empty() {
            return Ok(None);
        }
        let count = usize::from(self.u16_at(at + 4)?);
        let glyphs: Vec<u16> = covered.iter().map(|&(g, _)| g).collect();

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&glyphs));
        t.u16(covered.len() as u16);
        for &(_, index) in &covered {
            if index >= count {
                return Err(truncated());
            }
            let record = at + 6 + index * 4;
            self.anchor_field(&mut t, at, record)?;
            self.anchor_field(&mut t, at, record + 2)?;
        }
        Ok(Some(t))
    }

    fn mark_array(&self, at: usize, marks: &[(u16, usize)]) -> Result<Table, FontError> {
        let count = usize::from(self.u16_at(at)?);
        let mut t = Table::default();
        t.u16(marks.len() as u16);
        for &(_, index) in marks {
            if index >= count {
                return Err(truncated());
            }
            let record = at + 2 + index * 4;
            t.u16(self.u16_at(record)?); // markClass
            self.anchor_field(&mut t, at, record + 2)?;
        }
        Ok(t)
    }

    fn mark_attachment(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("mark attachment format", format));
        }
        let marks = self.kept_coverage(self.required(at, at + 2)?)?;
        let bases = self.kept_coverage(self.required(at, at + 4)?)?;
        if marks.is_empty() || bases.is_empty() {
            return Ok(None);
        }
        let class_count = usize::from(self.u16_at(at + 6)?);
        let mark_array_at = self.required(at, at + 8)?;
        let base_array_at = self.required(at, at + 10)?;

        let base_count = usize::from(self.u16_at(base_array_at)?);
        let mut base_array = Table::default();
        base_array.u16(bases.len() as u16);
        for &(_, index) in &bases {
            if index >= base_count {
                return Err(truncated());
            }
            let record = base_array_at + 2 + index * class_count * 2;
            for class in 0..class_count {
                self.anchor_field(&mut base_array, base_array_at, record + class * 2)?;
            }
        }

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&marks.iter().map(|&(g, _)| g).collect::<Vec<_>>()));
        t.link(coverage_table(&bases.iter().map(|&(g, _)| g).collect::<Vec<_>>()));
        t.u16(class_count as u16);
        t.link(self.mark_array(mark_array_at, &marks)?);
        t.link(base_array);
        Ok(Some(t))
    }

    fn mark_to_ligature(&self, at: usize) -> Result<Option<Table>, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("mark-to-ligature format", format));
        }
        let marks = self.kept_coverage(self.required(at, at + 2)?)?;
        let ligatures = self.kept_coverage(self.required(at, at + 4)?)?;
        if marks.is_empty() || ligatures.is_empty() {
            return Ok(None);
        }
        let class_count = usize::from(self.u16_at(at + 6)?);
        let mark_array_at = self.required(at, at + 8)?;
        let ligature_array_at = self.required(at, at + 10)?;

        let ligature_count = usize::from(self.u16_at(ligature_array_at)?);
        let mut ligature_array = Table::default();
        ligature_array.u16(ligatures.len() as u16);
        for &(_, index) in &ligatures {
            if index >= ligature_count {
                return Err(truncated());
            }
            let attach_at = self.required(ligature_array_at, ligature_array_at + 2 + index * 2)?;
            let components = usize::from(self.u16_at(attach_at)?);
            let mut attach = Table::default();
            attach.u16(components as u16);
            for slot in 0..components * class_count {
                self.anchor_field(&mut attach, attach_at, attach_at + 2 + slot * 2)?;
            }
            ligature_array.link(attach);
        }

        let mut t = Table::default();
        t.u16(1);
        t.link(coverage_table(&marks.iter().map(|&(g, _)| g).collect::<Vec<_>>()));
        t.link(coverage_table(&ligatures.iter().map(|&(g, _)| g).collect::<Vec<_>>()));
        t.u16(class_count as u16);
        t.link(self.mark_array(mark_array_at, &marks)?);
        t.link(ligature_array);
        Ok(Some(t))
    }

    // ─── GDEF ───────────────────────────────────────────────────

    fn gdef(&self) -> Result<Table, FontError> {
        let major = self.u16_at(0)?;
        let minor = self.u16_at(2)?;
        if major != 1 {
            return Err(unsupported("GDEF major version", major));
        }
        if minor >= 3 && self.u32_at(14)? != 0 {
            return Err(FontError::Unsupported("GDEF item variation store".to_string()));
        }
        let minor = minor.min(2);

        let mut t = Table::default();
        t.u16(1);
        t.u16(minor);
        let glyph_classes = self.offset(0, 4)?.map(|c| self.kept_classes(c)).transpose()?;
        t.link_opt(glyph_classes.as_deref().map(class_def_table));
        t.link_opt(self.offset(0, 6)?.map(|a| self.attach_list(a)).transpose()?.flatten());
        t.link_opt(self.offset(0, 8)?.map(|l| self.lig_caret_list(l)).transpose()?.flatten());
        let mark_classes = self.offset(0, 10)?.map(|c| self.kept_classes(c)).transpose()?;
        t.link_opt(mark_classes.as_deref().map(class_def_table));
        if minor >= 2 {
            t.link_opt(self.offset(0, 12)?.map(|m| self.mark_glyph_sets(m)).transpose()?);
        }
        Ok(t)
    }

    fn attach_list(&self, at: usize) -> Result<Option<Table>, FontError> {
        let covered = self.kept_coverage(self.required(at, at)?)?;
        let count = usize::from(self.u16_at(at + 2)?);
        let mut glyphs = Vec::new();
        let mut points = Vec::new();
        for (g, index) in covered {
            if index >= count {
                continue;
            }
            let point_at = self.required(at, at + 4 + index * 2)?;
            let len = usize::from(self.u16_at(point_at)?);
            glyphs.push(g);
            points.push(Table::from_bytes(self.bytes(point_at, 2 + len * 2)?));
        }
        if glyphs.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.link(coverage_table(&glyphs));
        t.u16(points.len() as u16);
        for point in points {
            t.link(point);
        }
        Ok(Some(t))
    }

    fn lig_caret_list(&self, at: usize) -> Result<Option<Table>, FontError> {
        let covered = self.kept_coverage(self.required(at, at)?)?;
        let count = usize::from(self.u16_at(at + 2)?);
        let mut glyphs = Vec::new();
        let mut carets = Vec::new();
        for (g, index) in covered {
            if index >= count {
                continue;
            }
            let lig_at = self.required(at, at + 4 + index * 2)?;
            let caret_count = usize::from(self.u16_at(lig_at)?);
            let mut lig_glyph = Table::default();
            lig_glyph.u16(caret_count as u16);
            for k in 0..caret_count {
                lig_glyph.link(self.caret_value(self.required(lig_at, lig_at + 2 + k * 2)?)?);
            }
            glyphs.push(g);
            carets.push(lig_glyph);
        }
        if glyphs.is_empty() {
            return Ok(None);
        }

        let mut t = Table::default();
        t.link(coverage_table(&glyphs));
        t.u16(carets.len() as u16);
        for caret in carets {
            t.link(caret);
        }
        Ok(Some(t))
    }

    fn caret_value(&self, at: usize) -> Result<Table, FontError> {
        match self.u16_at(at)? {
            1 | 2 => Ok(Table::from_bytes(self.bytes(at, 4)?)),
            3 => {
                let mut t = Table::from_bytes(self.bytes(at, 4)?);
                let device = self.offset(at, at + 4)?.map(|d| self.device(d)).transpose()?;
                t.link_opt(device);
                Ok(t)
            }
            format => Err(unsupported("caret value format", format)),
        }
    }

    /// Mark glyph sets keep their indices, so emptied sets stay in place.
    fn mark_glyph_sets(&self, at: usize) -> Result<Table, FontError> {
        let format = self.u16_at(at)?;
        if format != 1 {
            return Err(unsupported("mark glyph sets format", format));
        }
        let count = usize::from(self.u16_at(at + 2)?);
        let mut t = Table::default();
        t.u16(1);
        t.u16(count as u16);
        for k in 0..count {
            let coverage_at = at + self.u32_at(at + 4 + k * 4)? as usize;
            t.link_wide(coverage_table(&self.kept_glyphs(coverage_at)?));
        }
        Ok(t)
    }
}

fn value_record_len(format: u16) -> usize {
    (format & 0x00FF).count_ones() as usize * 2
}

fn push_records(t: &mut Table, records: &[(u16, u16)]) {
    for &(sequence_index, lookup_index) in records {
        t.u16(sequence_index);
        t.u16(lookup_index);
    }
}

/// Classes that can still match: class 0 plus every class a kept glyph
/// carries.
fn live_classes(classes: Option<&[(u16, u16)]>) -> BTreeSet<u16> {
    let mut live = BTreeSet::from([0]);
    live.extend(classes.unwrap_or_default().iter().map(|&(_, class)| class));
    live
}

/// Old class numbers still in use, in order; position is the new number.
fn compact_classes(entries: &[(u16, u16)], count: usize) -> Result<Vec<u16>, FontError> {
    let used = live_classes(Some(entries));
    if used.iter().any(|&class| usize::from(class) >= count.max(1)) {
        return Err(FontError::Malformed("class outside the class count".to_string()));
    }
    Ok(used.into_iter().collect())
}

fn renumber(entries: &[(u16, u16)], order: &[u16]) -> Vec<(u16, u16)> {
    entries
        .iter()
        .filter_map(|&(g, class)| {
            order
                .iter()
                .position(|&old| old == class)
                .map(|new| (g, new as u16))
        })
        .collect()
}

fn lookup_list_table(lookups: &[Lookup], kind: LayoutKind, extension: bool) -> Table {
    let mut list = Table::default();
    list.u16(lookups.len() as u16);
    for lookup in lookups {
        let mut t = Table::default();
        t.u16(if extension {
            kind.extension_type()
        } else {
            lookup.lookup_type
        });
        t.u16(lookup.flag);
        t.u16(lookup.subtables.len() as u16);
        for subtable in &lookup.subtables {
            if extension {
                let mut wrapper = Table::default();
                wrapper.u16(1);
                wrapper.u16(lookup.lookup_type);
                wrapper.link_wide(subtable.clone());
                t.link(wrapper);
            } else {
                t.link(subtable.clone());
            }
        }
        if let Some(set) = lookup.mark_filtering_set {
            t.u16(set);
        }
        list.link(t);
    }
    list
}

// ─── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn reader<'a>(data: &'a [u8], kept: &'a BTreeSet<u16>) -> Pruner<'a> {
        Pruner {
            data,
            kept,
            lookup_map: None,
        }
    }

    /// A GSUB/GPOS table with one feature `liga` calling every lookup, and
    /// the given lookup subtables (type, bytes), one per lookup.
    fn layout_table(lookups: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let n = lookups.len() as u16;
        let mut data = words(&[1, 0, 10, 14, 26 + n * 2]);
        data.extend(words(&[0, 0])); // ScriptList @10: no scripts, padding
        data.extend(words(&[1, 0x6C69, 0x6761, 8])); // FeatureList @14
        data.extend(words(&[0, n])); // Feature @22
        data.extend(words(&(0..n).collect::<Vec<_>>()));

        // LookupList, then each lookup followed by its subtable
        let list_at = data.len();
        let mut offset = 2 + n as usize * 2;
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for (lookup_type, subtable) in lookups {
            offsets.push(offset as u16);
            let mut lookup = words(&[*lookup_type, 0, 1, 8]);
            lookup.extend_from_slice(subtable);
            offset += lookup.len();
            body.extend(lookup);
        }
        data.extend(words(&[n]));
        data.extend(words(&offsets));
        data.extend(body);
        assert_eq!(list_at, 26 + n as usize * 2);
        data
    }

    /// LookupList offset and lookup count of a packed layout table.
    fn lookups_of(data: &[u8]) -> (usize, u16) {
        let at = u16::from_be_bytes([data[8], data[9]]) as usize;
        (at, u16::from_be_bytes([data[at], data[at + 1]]))
    }

    #[test]
    fn test_coverage_table_picks_smaller_format() {
        let sparse = coverage_table(&[3, 9, 40]);
        assert_eq!(sparse.bytes, words(&[1, 3, 3, 9, 40]));

        let dense: Vec<u16> = (100..120).collect();
        let ranged = coverage_table(&dense);
        assert_eq!(ranged.bytes, words(&[2, 1, 100, 119, 0]));
    }

    #[test]
    fn test_coverage_round_trip_through_reader() {
        let glyphs = vec![1, 2, 3, 7, 8, 20];
        let bytes = pack(&coverage_table(&glyphs)).unwrap();
        let kept = BTreeSet::from([2, 8, 20]);
        let pruner = reader(&bytes, &kept);
        assert_eq!(pruner.coverage(0).unwrap(), glyphs);
        assert_eq!(pruner.kept_coverage(0).unwrap(), vec![(2, 1), (8, 4), (20, 5)]);
    }

    #[test]
    fn test_kept_classes_drops_unkept_glyphs() {
        // format 2: 1..=5 class 1, 10..=12 class 2
        let data = words(&[2, 2, 1, 5, 1, 10, 12, 2]);
        let kept = BTreeSet::from([0, 4, 11, 30]);
        assert_eq!(reader(&data, &kept).kept_classes(0).unwrap(), vec![(4, 1), (11, 2)]);

        // format 1: glyphs 6, 7, 8 with classes 0, 3, 1
        let data = words(&[1, 6, 3, 0, 3, 1]);
        let kept = BTreeSet::from([6, 7]);
        assert_eq!(reader(&data, &kept).kept_classes(0).unwrap(), vec![(7, 3)]);
    }

    #[test]
    fn test_class_def_table_merges_runs() {
        let table = class_def_table(&[(10, 1), (11, 1), (12, 2), (40, 1)]);
        assert_eq!(table.bytes, words(&[2, 3, 10, 11, 1, 12, 12, 2, 40, 40, 1]));

        let table = class_def_table(&[(5, 1), (6, 2), (7, 1)]);
        assert_eq!(table.bytes, words(&[1, 5, 3, 1, 2, 1]));
    }

    #[test]
    fn test_pack_patches_offsets() {
        let mut leaf = Table::default();
        leaf.u16(0xBEEF);
        let mut middle = Table::default();
        middle.u16(7);
        middle.link(leaf);
        let mut root = Table::default();
        root.link(middle);
        root.link_wide(Table::from_bytes(&[0xAA, 0xBB]));

        let bytes = pack(&root).unwrap();
        // root: off16 (2) + off32 (4); middle at 6: value + off16; leaf at 10
        assert_eq!(
            bytes,
            vec![0, 6, 0, 0, 0, 12, 0, 7, 0, 4, 0xBE, 0xEF, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_pack_reports_overflow() {
        let mut root = Table::default();
        root.link(Table::from_bytes(&[0u8; 70_000]));
        root.link(Table::from_bytes(&[1, 2]));
        assert!(pack(&root).is_err());
    }

    #[test]
    fn test_ligatures_need_every_component() {
        // Ligature subtable: A(1)+B(2) -> 5, A(1)+C(3) -> 6
        let mut ligature = words(&[1, 8, 1, 14]);
        ligature.extend(words(&[1, 1, 1])); // coverage {1}
        ligature.extend(words(&[2, 6, 12])); // LigatureSet
        ligature.extend(words(&[5, 2, 2]));
        ligature.extend(words(&[6, 2, 3]));
        let data = layout_table(&[(4, ligature)]);

        let kept = BTreeSet::from([0, 1, 2, 5]);
        let pruned = prune_layout_table(Tag::GSUB, &data, &kept).unwrap();
        let (list_at, count) = lookups_of(&pruned);
        assert_eq!(count, 1);

        let p = reader(&pruned, &kept);
        let lookup_at = p.required(list_at, list_at + 2).unwrap();
        let sub_at = p.required(lookup_at, lookup_at + 6).unwrap();
        let set_at = p.required(sub_at, sub_at + 6).unwrap();
        assert_eq!(p.u16_at(set_at).unwrap(), 1);
        let lig_at = p.required(set_at, set_at + 2).unwrap();
        assert_eq!(p.u16_array(lig_at, 3).unwrap(), vec![5, 2, 2]);
    }

    #[test]
    fn test_dead_lookups_are_removed_and_features_renumbered() {
        // lookup 0: single subst covering glyph 9 only; lookup 1: covering glyph 1
        let dead = words(&[2, 8, 1, 10, 1, 1, 9]);
        let live = words(&[2, 8, 1, 11, 1, 1, 1]);
        let data = layout_table(&[(1, dead), (1, live)]);

        let kept = BTreeSet::from([0, 1, 11]);
        let pruned = prune_layout_table(Tag::GSUB, &data, &kept).unwrap();
        assert_eq!(lookups_of(&pruned).1, 1);

        let p = reader(&pruned, &kept);
        let features_at = p.required(0, 6).unwrap();
        let feature_at = p.required(features_at, features_at + 6).unwrap();
        assert_eq!(p.u16_array(feature_at + 2, 2).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_context_records_follow_renumbering() {
        // lookup 0: dead single subst; lookup 1: live single subst;
        // lookup 2: context format 3 over glyph 1 calling lookups 0 and 1
        let dead = words(&[2, 8, 1, 10, 1, 1, 9]);
        let live = words(&[2, 8, 1, 11, 1, 1, 1]);
        let mut context = words(&[3, 1, 2, 16, 0, 0, 0, 1]);
        context.extend(words(&[1, 1, 1]));
        let data = layout_table(&[(1, dead), (1, live), (5, context)]);

        let kept = BTreeSet::from([0, 1, 11]);
        let pruned = prune_layout_table(Tag::GSUB, &data, &kept).unwrap();
        let (list_at, count) = lookups_of(&pruned);
        assert_eq!(count, 2);

        let p = reader(&pruned, &kept);
        let lookup_at = p.required(list_at, list_at + 4).unwrap();
        let sub_at = p.required(lookup_at, lookup_at + 6).unwrap();
        // format 3, one glyph, one surviving record calling the new lookup 0
        assert_eq!(p.u16_array(sub_at, 3).unwrap(), vec![3, 1, 1]);
        assert_eq!(p.u16_array(sub_at + 8, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_pair_set_drops_unkept_second_glyphs() {
        // PairPos format 1: first glyph 1, pairs with 2 (-50) and 6 (-30)
        let mut pair = words(&[1, 12, 4, 0, 1, 18]);
        pair.extend(words(&[1, 1, 1]));
        pair.extend(words(&[2, 2, (-50i16) as u16, 6, (-30i16) as u16]));
        let data = layout_table(&[(2, pair)]);

        let kept = BTreeSet::from([0, 1, 2]);
        let pruned = prune_layout_table(Tag::GPOS, &data, &kept).unwrap();
        let (list_at, _) = lookups_of(&pruned);
        let p = reader(&pruned, &kept);
        let lookup_at = p.required(list_at, list_at + 2).unwrap();
        let sub_at = p.required(lookup_at, lookup_at + 6).unwrap();
        let set_at = p.required(sub_at, sub_at + 10).unwrap();
        assert_eq!(p.u16_array(set_at, 3).unwrap(), vec![1, 2, (-50i16) as u16]);
    }

    #[test]
    fn test_pair_classes_are_compacted() {
        // PairPos format 2, xAdvance only. Coverage {1, 2}; class1: 1 -> 1,
        // 2 -> 2; class2: 3 -> 1, 4 -> 2. Matrix value = row * 10 + col.
        let mut pair = words(&[2, 34, 4, 0, 42, 58, 3, 3]);
        for row in 0..3u16 {
            for col in 0..3u16 {
                pair.extend(words(&[row * 10 + col]));
            }
        }
        pair.extend(words(&[1, 2, 1, 2])); // coverage @34
        pair.extend(words(&[2, 2, 1, 1, 1, 2, 2, 2])); // class1 @42
        pair.extend(words(&[2, 2, 3, 3, 1, 4, 4, 2])); // class2 @58
        let data = layout_table(&[(2, pair)]);

        // Glyph 1 and glyph 4 survive: rows {0, 1}, cols {0, 2}
        let kept = BTreeSet::from([0, 1, 4]);
        let pruned = prune_layout_table(Tag::GPOS, &data, &kept).unwrap();
        let (list_at, _) = lookups_of(&pruned);
        let p = reader(&pruned, &kept);
        let lookup_at = p.required(list_at, list_at + 2).unwrap();
        let sub_at = p.required(lookup_at, lookup_at + 6).unwrap();
        assert_eq!(p.u16_array(sub_at + 12, 2).unwrap(), vec![2, 2]);
        assert_eq!(p.u16_array(sub_at + 16, 4).unwrap(), vec![0, 2, 10, 12]);
        let class2_at = p.required(sub_at, sub_at + 10).unwrap();
        assert_eq!(p.kept_classes(class2_at).unwrap(), vec![(4, 1)]);
    }

    #[test]
    fn test_feature_variations_are_unsupported() {
        let mut data = layout_table(&[]);
        data[3] = 1; // version 1.1, featureVariations offset at 10
        data[13] = 40;
        assert!(matches!(
            prune_layout_table(Tag::GSUB, &data, &BTreeSet::new()),
            Err(FontError::Unsupported(_))
        ));
    }

    #[test]
    fn test_gdef_glyph_classes_pruned() {
        // GDEF 1.0 with a glyph class definition at 12
        let mut data = words(&[1, 0, 12, 0, 0, 0]);
        data.extend(words(&[2, 3, 1, 2, 1, 5, 5, 2, 6, 6, 1]));
        let kept = BTreeSet::from([0, 1, 5]);
        let pruned = prune_layout_table(Tag::GDEF, &data, &kept).unwrap();

        let p = reader(&pruned, &kept);
        let classes_at = p.required(0, 4).unwrap();
        assert_eq!(p.kept_classes(classes_at).unwrap(), vec![(1, 1), (5, 2)]);
        assert_eq!(p.u16_array(6, 3).unwrap(), vec![0, 0, 0]);
    }
}
