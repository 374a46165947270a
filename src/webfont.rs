//! # Web Font Preparation
//!
//! Loads a font, drops every table outside [`KEEP_TABLES`], reduces glyph
//! coverage to the needed characters, and writes the result as a web font.
//!
//! ```text
//! font file
//!     ↓
//!   [pre-filter]        : drop tables outside the keep-list
//!     ↓
//!   [reduce_to_charset] : prune glyphs, cmap, metrics
//!     ↓
//!   [serialize]         : WOFF2 by default
//!     ↓
//! output file + size report
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::font::{CharsetReducer, Flavor, Font, GlyfSubsetter, Tag, KEEP_TABLES};
use crate::messages::Language;

/// Input and output sizes of a subsetting run, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub original: u64,
    pub output: u64,
}

impl SizeReport {
    /// `(1 - output / original) * 100`.
    pub fn reduction_percent(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        (1.0 - self.output as f64 / self.original as f64) * 100.0
    }
}

/// Append the sentinel character to a character inventory.
pub fn needed_characters(inventory: &str, sentinel: char) -> String {
    let mut needed = String::with_capacity(inventory.len() + sentinel.len_utf8());
    needed.push_str(inventory);
    needed.push(sentinel);
    needed
}

/// Subsets fonts to a character set and writes them as web fonts.
pub struct FontSubsetter<R = GlyfSubsetter> {
    reducer: R,
    flavor: Flavor,
    language: Language,
}

impl FontSubsetter<GlyfSubsetter> {
    pub fn new() -> Self {
        FontSubsetter::with_reducer(GlyfSubsetter::default())
    }
}

impl Default for FontSubsetter<GlyfSubsetter> {
    fn default() -> Self {
        FontSubsetter::new()
    }
}

impl<R: CharsetReducer> FontSubsetter<R> {
    pub fn with_reducer(reducer: R) -> Self {
        FontSubsetter {
            reducer,
            flavor: Flavor::default(),
            language: Language::default(),
        }
    }

    /// Output container flavor. Defaults to WOFF2.
    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Language of the lines [`FontSubsetter::subset_font`] prints.
    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Subset `input` to the distinct characters of `needed` and write the
    /// result to `output`. The output file is only written once every
    /// earlier step has succeeded.
    pub fn run(&self, input: &Path, output: &Path, needed: &str) -> Result<SizeReport, Error> {
        if !input.exists() {
            return Err(Error::MissingInput(input.to_path_buf()));
        }

        let data = fs::read(input).map_err(|e| Error::io(input, e))?;
        let mut font = Font::from_bytes(&data)?;

        let dropped = font.retain_tables(&KEEP_TABLES);
        if !dropped.is_empty() {
            log::debug!("dropped tables: {}", join_tags(&dropped));
        }

        let chars: BTreeSet<char> = needed.chars().collect();
        let font = self.reducer.reduce_to_charset(font, &chars)?;
        let bytes = font.serialize(self.flavor)?;

        fs::write(output, &bytes).map_err(|e| Error::io(output, e))?;

        Ok(SizeReport {
            original: data.len() as u64,
            output: bytes.len() as u64,
        })
    }

    /// Run [`FontSubsetter::run`] and report the outcome on stdout.
    ///
    /// Returns `false` on any failure instead of propagating it.
    pub fn subset_font(&self, input: &Path, output: &Path, needed: &str) -> bool {
        match self.run(input, output, needed) {
            Ok(report) => {
                println!("{}", self.language.font_processed(input, output));
                println!("{}", self.language.size_reduced(&report));
                true
            }
            Err(e) => {
                println!("{}", self.language.font_failed(&e));
                false
            }
        }
    }
}

fn join_tags(tags: &[Tag]) -> String {
    tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(", ")
}
