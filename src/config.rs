//! Run configuration for the two binaries.
//!
//! Defaults reproduce the fixed paths the tools have always used. A JSON
//! file named by `GLYPHTRIM_CONFIG` overrides any subset of the fields:
//!
//! ```json
//! {
//!   "extract": { "input": "data/table.json", "targetKeys": ["cn", "jp", "kr"] },
//!   "subset":  { "font": "fonts/Source.ttf", "flavor": "woff", "nameIds": [1, 2] },
//!   "language": "zh"
//! }
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::extract::TargetKeys;
use crate::font::{Flavor, GlyfSubsetter};
use crate::messages::Language;

/// Environment variable holding the path of a JSON configuration file.
pub const CONFIG_ENV: &str = "GLYPHTRIM_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub extract: ExtractConfig,
    pub subset: SubsetConfig,
    /// Language of the printed status lines.
    pub language: Language,
}

/// Character extraction settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractConfig {
    /// JSON document to scan.
    pub input: PathBuf,
    /// Where the character inventory is written.
    pub output: PathBuf,
    /// Field names whose string values are collected.
    pub target_keys: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            input: PathBuf::from("table_frame.json"),
            output: PathBuf::from("table_used_characters.txt"),
            target_keys: vec!["cn".to_string(), "jp".to_string()],
        }
    }
}

impl ExtractConfig {
    pub fn target_keys(&self) -> Result<TargetKeys, Error> {
        TargetKeys::new(self.target_keys.iter().cloned())
    }
}

/// Font subsetting settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubsetConfig {
    /// Source font.
    pub font: PathBuf,
    /// Subset font output.
    pub output: PathBuf,
    /// Character inventory produced by the extractor.
    pub characters: PathBuf,
    /// Always kept, whatever the inventory holds.
    pub sentinel: char,
    pub flavor: Flavor,
    /// Name IDs kept in the `name` table.
    pub name_ids: Vec<u16>,
    /// Keep `post` glyph names.
    pub glyph_names: bool,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        SubsetConfig {
            font: PathBuf::from("QiushuiShotai.ttf"),
            output: PathBuf::from("QiushuiShotaiLite.woff2"),
            characters: PathBuf::from("table_used_characters.txt"),
            sentinel: '●',
            flavor: Flavor::Woff2,
            name_ids: GlyfSubsetter::default().name_ids,
            glyph_names: false,
        }
    }
}

impl SubsetConfig {
    pub fn subsetter(&self) -> GlyfSubsetter {
        GlyfSubsetter {
            name_ids: self.name_ids.clone(),
            glyph_names: self.glyph_names,
        }
    }
}

impl Config {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the file named by [`CONFIG_ENV`], or use the defaults.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                log::debug!("loading configuration from {:?}", path);
                Config::load(Path::new(&path))
            }
            None => Ok(Config::default()),
        }
    }
}
