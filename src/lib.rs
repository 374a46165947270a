//! # glyphtrim
//!
//! Build-time web font preparation in two steps.
//!
//! A page that renders its text in a large CJK display font only ever uses
//! a few hundred of the font's tens of thousands of glyphs. glyphtrim finds
//! out which characters the page's data actually contains, then cuts the
//! font down to exactly those glyphs and ships it as WOFF2.
//!
//! ## Architecture
//!
//! ```text
//! table_frame.json
//!       ↓
//!   [extract]  : characters under the target keys, sorted, deduplicated
//!       ↓
//! table_used_characters.txt  (+ sentinel '●')
//!       ↓
//!   [webfont]  : keep-list filter → glyph subset → WOFF2
//!       ↓
//! QiushuiShotaiLite.woff2
//! ```
//!
//! The two steps are independent binaries (`extract-chars`, `subset-font`);
//! the text file in the middle is the only thing they share.

pub mod config;
pub mod error;
pub mod extract;
pub mod font;
pub mod messages;
pub mod webfont;

pub use config::Config;
pub use error::Error;
pub use extract::{extract, process_file, TargetKeys};
pub use messages::Language;
pub use webfont::{FontSubsetter, SizeReport};
