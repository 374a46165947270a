//! # Character Extraction
//!
//! Walks a JSON document and collects every character that appears in a
//! string value stored under one of the target keys, at any depth. The
//! resulting inventory drives the font subsetter.
//!
//! ```text
//! {"items":[{"cn":"你好"},{"en":"hello"}]}   keys = {cn}
//!         ↓
//!   {你, 好}  →  "你好"
//! ```
//!
//! Nesting depth is not limited. Parsing grows the stack on demand and the
//! walk keeps its own work list.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::messages::Language;

/// Field names whose string values are collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetKeys(BTreeSet<String>);

impl TargetKeys {
    /// Build a key set. At least one key is required.
    pub fn new<I, S>(keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(Error::EmptyTargetKeys);
        }
        Ok(TargetKeys(keys))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl Default for TargetKeys {
    fn default() -> Self {
        TargetKeys(["cn", "jp"].iter().map(|k| k.to_string()).collect())
    }
}

/// Outcome of a successful [`extract_file`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    /// Number of unique characters written.
    pub unique_chars: usize,
    /// Where the inventory was written.
    pub output: PathBuf,
}

/// Collect the characters of every string stored under a target key.
pub fn extract(document: &Value, keys: &TargetKeys) -> BTreeSet<char> {
    let mut chars = BTreeSet::new();
    let mut pending = vec![document];
    while let Some(value) = pending.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    match child {
                        Value::String(text) if keys.contains(key) => chars.extend(text.chars()),
                        Value::Object(_) | Value::Array(_) => pending.push(child),
                        _ => {}
                    }
                }
            }
            Value::Array(items) => pending.extend(items.iter()),
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
    }
    chars
}

/// Parse a JSON document of any nesting depth.
pub fn parse_document(text: &str) -> Result<Value, Error> {
    let mut json = serde_json::Deserializer::from_str(text);
    json.disable_recursion_limit();
    let document = Value::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(document)
}

/// Drop a document without recursing into it.
fn dismantle(document: Value) {
    let mut pending = vec![document];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.into_iter().map(|(_, child)| child)),
            _ => {}
        }
    }
}

/// Materialize a character set as one string, ascending by code point.
pub fn characters_to_string(chars: &BTreeSet<char>) -> String {
    chars.iter().collect()
}

/// Read `input`, extract, and write the sorted inventory to `output`.
///
/// Nothing is written unless the input exists and parses.
pub fn extract_file(
    input: &Path,
    output: &Path,
    keys: &TargetKeys,
) -> Result<ExtractReport, Error> {
    if !input.exists() {
        return Err(Error::MissingInput(input.to_path_buf()));
    }

    let text = fs::read_to_string(input).map_err(|e| Error::io(input, e))?;
    let document = parse_document(&text)?;

    let chars = extract(&document, keys);
    dismantle(document);
    log::debug!(
        "extracted {} unique characters from {}",
        chars.len(),
        input.display()
    );

    fs::write(output, characters_to_string(&chars)).map_err(|e| Error::io(output, e))?;

    Ok(ExtractReport {
        unique_chars: chars.len(),
        output: output.to_path_buf(),
    })
}

/// Run [`extract_file`] and report the outcome on stdout in English.
///
/// Returns `false` on any failure instead of propagating it.
pub fn process_file(input: &Path, output: &Path, keys: &TargetKeys) -> bool {
    process_file_in(Language::default(), input, output, keys)
}

/// [`process_file`] with the report written in `language`.
pub fn process_file_in(language: Language, input: &Path, output: &Path, keys: &TargetKeys) -> bool {
    match extract_file(input, output, keys) {
        Ok(report) => {
            println!("{}", language.extraction_complete());
            println!("{}", language.unique_characters(report.unique_chars));
            println!("{}", language.saved_to(&report.output));
            true
        }
        Err(e) => {
            println!("{}", language.extraction_failed(&e));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(list: &[&str]) -> TargetKeys {
        TargetKeys::new(list.iter().copied()).unwrap()
    }

    #[test]
    fn test_default_keys() {
        let k = TargetKeys::default();
        assert!(k.contains("cn"));
        assert!(k.contains("jp"));
        assert!(!k.contains("en"));
    }

    #[test]
    fn test_empty_keys_rejected() {
        let empty: Vec<String> = Vec::new();
        assert!(matches!(TargetKeys::new(empty), Err(Error::EmptyTargetKeys)));
    }

    #[test]
    fn test_mixed_document() {
        let doc = json!({"items":[{"cn":"你好"},{"jp":"こんにちは"},{"en":"hello"}]});
        let chars = extract(&doc, &keys(&["cn", "jp"]));
        let expected: BTreeSet<char> = "你好こんにちは".chars().collect();
        assert_eq!(chars.len(), 7);
        assert_eq!(chars, expected);
    }

    #[test]
    fn test_non_string_under_target_key() {
        let doc = json!({"cn": 42});
        assert!(extract(&doc, &keys(&["cn"])).is_empty());
    }

    #[test]
    fn test_nested_object_under_target_key_is_traversed() {
        let doc = json!({"cn": {"cn": "深", "other": 1}, "jp": [null, true, {"jp": "い"}]});
        let chars = extract(&doc, &keys(&["cn", "jp"]));
        assert_eq!(characters_to_string(&chars), "い深");
    }

    #[test]
    fn test_empty_string_contributes_nothing() {
        let doc = json!([{"cn": ""}, {"cn": "a"}]);
        assert_eq!(characters_to_string(&extract(&doc, &keys(&["cn"]))), "a");
    }

    #[test]
    fn test_duplicates_collapse() {
        let doc = json!({"a": {"cn": "aab"}, "b": [{"cn": "bba"}]});
        assert_eq!(characters_to_string(&extract(&doc, &keys(&["cn"]))), "ab");
    }

    #[test]
    fn test_top_level_scalar() {
        assert!(extract(&json!("cn"), &keys(&["cn"])).is_empty());
        assert!(extract(&Value::Null, &keys(&["cn"])).is_empty());
    }

    #[test]
    fn test_supplementary_plane_chars() {
        let doc = json!({"cn": "𠀀a"});
        let chars = extract(&doc, &keys(&["cn"]));
        assert_eq!(characters_to_string(&chars), "a𠀀");
    }

    #[test]
    fn test_sorted_by_code_point() {
        let doc = json!({"cn": "zA中a"});
        let out = characters_to_string(&extract(&doc, &keys(&["cn"])));
        let points: Vec<u32> = out.chars().map(|c| c as u32).collect();
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }

    fn nested(depth: usize) -> String {
        let mut text = String::new();
        for _ in 0..depth {
            text.push_str(r#"{"next":["#);
        }
        text.push_str(r#"{"cn":"底"}"#);
        for _ in 0..depth {
            text.push_str("]}");
        }
        text
    }

    #[test]
    fn test_deeply_nested_document() {
        let document = parse_document(&nested(250)).unwrap();
        assert_eq!(characters_to_string(&extract(&document, &keys(&["cn"]))), "底");
        dismantle(document);
    }

    #[test]
    fn test_very_deep_document_does_not_overflow() {
        let document = parse_document(&nested(20_000)).unwrap();
        assert_eq!(extract(&document, &keys(&["cn"])).len(), 1);
        dismantle(document);
    }

    #[test]
    fn test_trailing_data_is_rejected() {
        assert!(matches!(parse_document(r#"{"cn":"a"} x"#), Err(Error::Json { .. })));
        assert!(matches!(parse_document("[[[1]]"), Err(Error::Json { .. })));
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let doc = json!({"rows": [{"jp": "ねこ"}, {"cn": "猫"}]});
        let k = keys(&["cn", "jp"]);
        assert_eq!(extract(&doc, &k), extract(&doc, &k));
    }
}
