//! Structured error types for glyphtrim.
//!
//! The variants follow the real failure sources: a missing input, file I/O,
//! JSON that does not parse, and fonts that cannot be loaded, subset, or
//! written.

use std::path::PathBuf;

use crate::font::FontError;

/// The unified error type returned by the `Result`-flavoured glyphtrim API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input file does not exist.
    #[error("input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON input failed to parse.
    #[error("{}", json_message(.source, .hint))]
    Json {
        #[source]
        source: serde_json::Error,
        hint: String,
    },

    /// A font could not be loaded, subset, or serialized.
    #[error("font error: {0}")]
    Font(#[from] FontError),

    /// The configuration file could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// A target key set must name at least one key.
    #[error("target key set is empty")]
    EmptyTargetKeys,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

fn json_message(source: &serde_json::Error, hint: &str) -> String {
    if hint.is_empty() {
        format!("JSON parse error: {}", source)
    } else {
        format!("JSON parse error: {}\n  Hint: {}", source, hint)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but a field has the wrong type.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input; is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        Error::Json { source: e, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_carries_hint() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not valid")
            .unwrap_err()
            .into();
        let msg = err.to_string();
        assert!(msg.starts_with("JSON parse error"), "got: {}", msg);
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_eof_error_hint() {
        let err: Error = serde_json::from_str::<serde_json::Value>("[1, 2")
            .unwrap_err()
            .into();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_missing_input_message() {
        let err = Error::MissingInput(PathBuf::from("/nonexistent.json"));
        assert_eq!(
            err.to_string(),
            "input file does not exist: /nonexistent.json"
        );
    }
}
