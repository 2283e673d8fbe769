//! Minimal document parsers for the upload path: plain text and markdown.
//! Binary formats (PDF, DOCX) are converted upstream by a collaborator and
//! arrive here as text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Markdown,
    Text,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Markdown => "markdown",
            FileType::Text => "text",
        }
    }
}

pub fn detect_file_type(file_name: &str) -> FileType {
    match file_name.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("md") | Some("markdown") => FileType::Markdown,
        _ => FileType::Text,
    }
}

/// Normalize raw document bytes-as-text for chunking: strip the BOM, unify
/// line endings, and collapse runs of blank lines.
pub fn parse_document(raw: &str, _file_type: FileType) -> String {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert_eq!(detect_file_type("policy.md"), FileType::Markdown);
        assert_eq!(detect_file_type("notes.MARKDOWN"), FileType::Markdown);
        assert_eq!(detect_file_type("readme.txt"), FileType::Text);
        assert_eq!(detect_file_type("no_extension"), FileType::Text);
    }

    #[test]
    fn normalization_strips_bom_and_collapses_blanks() {
        let raw = "\u{feff}# Title\r\n\r\n\r\n\r\nBody line.  \r\n";
        let parsed = parse_document(raw, FileType::Markdown);
        assert_eq!(parsed, "# Title\n\nBody line.");
    }
}
