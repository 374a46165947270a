//! User-facing status lines printed by the two tools.
//!
//! English is the default. Chinese reproduces the wording the tools printed
//! before they were configurable, selected with `"language": "zh"` in the
//! configuration file. Errors keep their English `Display` text inside the
//! Chinese lines, except for a missing input and unparseable JSON.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::webfont::SizeReport;

/// Language of the status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn extraction_complete(self) -> &'static str {
        match self {
            Language::En => "Extraction complete!",
            Language::Zh => "处理完成！",
        }
    }

    pub fn unique_characters(self, count: usize) -> String {
        match self {
            Language::En => format!("Unique characters extracted: {}", count),
            Language::Zh => format!("提取并去重后的字符总数：{}", count),
        }
    }

    pub fn saved_to(self, path: &Path) -> String {
        match self {
            Language::En => format!("Result saved to: {}", path.display()),
            Language::Zh => format!("结果已保存至：{}", path.display()),
        }
    }

    pub fn extraction_failed(self, error: &Error) -> String {
        match (self, error) {
            (Language::En, e) => format!("Extraction failed: {}", e),
            (Language::Zh, Error::MissingInput(path)) => {
                format!("错误：输入文件不存在 - {}", path.display())
            }
            (Language::Zh, Error::Json { source, .. }) => format!("JSON解析错误：{}", source),
            (Language::Zh, e) => format!("处理过程中发生错误：{}", e),
        }
    }

    pub fn font_processed(self, input: &Path, output: &Path) -> String {
        match self {
            Language::En => format!("Font processed: {} -> {}", input.display(), output.display()),
            Language::Zh => format!("字体处理完成: {} -> {}", input.display(), output.display()),
        }
    }

    pub fn size_reduced(self, report: &SizeReport) -> String {
        let percent = report.reduction_percent();
        match self {
            Language::En => format!(
                "Size reduced by {:.2}% ({} -> {} bytes)",
                percent, report.original, report.output
            ),
            Language::Zh => format!(
                "文件大小减少: {:.2}% ({} -> {} 字节)",
                percent, report.original, report.output
            ),
        }
    }

    pub fn font_failed(self, error: &Error) -> String {
        match (self, error) {
            (Language::En, e) => format!("Font processing failed: {}", e),
            (Language::Zh, Error::MissingInput(path)) => {
                format!("错误：原始字体文件不存在 - {}", path.display())
            }
            (Language::Zh, e) => format!("字体处理失败: {}", e),
        }
    }

    pub fn optimisation_complete(self) -> &'static str {
        match self {
            Language::En => "Font optimisation complete!",
            Language::Zh => "字体优化完成！",
        }
    }

    pub fn character_list_unreadable(self, path: &Path, error: &std::io::Error) -> String {
        match self {
            Language::En => format!("Failed to read character list {}: {}", path.display(), error),
            Language::Zh => format!("读取字符文件失败 {}: {}", path.display(), error),
        }
    }
}
