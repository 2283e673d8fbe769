//! Hybrid document chunking: heading-aware splitting for markdown, then a
//! recursive separator split for anything still over the token budget.
//!
//! Token counts use the `len/4` estimate, close enough to the hosted
//! model's tokenizer for budgeting, with no tokenizer dependency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use hearth_config::ChunkingConfig;

/// Separators tried in priority order; the empty string means a hard
/// character split.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", ""];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    /// Inherited heading path (`h1` → `h3`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub token_count: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub struct ChunkingService {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingService {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size / 2),
        }
    }

    /// `1 token ≈ 4 chars` estimate.
    pub fn count_tokens(text: &str) -> usize {
        text.len() / 4
    }

    fn max_chars(&self) -> usize {
        self.chunk_size * 4
    }

    fn overlap_chars(&self) -> usize {
        self.chunk_overlap * 4
    }

    /// Split one document into ordered chunks with deterministic ids.
    pub fn chunk_document(
        &self,
        text: &str,
        document_id: &str,
        file_type: &str,
    ) -> Vec<DocumentChunk> {
        let sections = if matches!(file_type, "markdown" | "md") {
            split_markdown_sections(text)
        } else {
            vec![Section {
                text: text.to_string(),
                headers: BTreeMap::new(),
            }]
        };

        let mut pieces: Vec<(String, BTreeMap<String, String>)> = Vec::new();
        for section in sections {
            if section.text.trim().is_empty() {
                continue;
            }
            if Self::count_tokens(&section.text) > self.chunk_size {
                for piece in self.split_text(&section.text) {
                    pieces.push((piece, section.headers.clone()));
                }
            } else {
                pieces.push((section.text, section.headers));
            }
        }

        let total_chunks = pieces.len();
        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, (chunk_text, headers))| {
                let chunk_id = generate_chunk_id(document_id, index);
                let section_title = headers
                    .get("h1")
                    .or_else(|| headers.get("h2"))
                    .or_else(|| headers.get("h3"))
                    .cloned();
                let metadata = ChunkMetadata {
                    chunk_id: chunk_id.clone(),
                    chunk_index: index,
                    total_chunks,
                    section_title,
                    headers,
                    token_count: Self::count_tokens(&chunk_text).max(1),
                    char_count: chunk_text.len(),
                };
                DocumentChunk {
                    id: chunk_id,
                    text: chunk_text,
                    metadata,
                }
            })
            .collect();

        debug!(
            document_id,
            chunks = chunks.len(),
            "document chunked"
        );
        chunks
    }

    /// Recursive separator split plus greedy merge with overlap carry-over.
    fn split_text(&self, text: &str) -> Vec<String> {
        let pieces = split_pieces(text, self.max_chars(), SEPARATORS);

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        for piece in pieces {
            if !current.is_empty() && current.len() + piece.len() > self.max_chars() {
                let tail = char_tail(&current, self.overlap_chars());
                chunks.push(std::mem::take(&mut current));
                current = tail;
            }
            current.push_str(&piece);
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

struct Section {
    text: String,
    headers: BTreeMap<String, String>,
}

/// Split on `#`/`##`/`###` headings, keeping the heading line inside its
/// section and inheriting the heading path downward.
fn split_markdown_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    let mut current = String::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let is_heading = (1..=3).contains(&level)
            && trimmed.chars().nth(level).map(|c| c == ' ').unwrap_or(false);

        if is_heading {
            if !current.trim().is_empty() {
                sections.push(Section {
                    text: current.trim_end().to_string(),
                    headers: headers.clone(),
                });
            }
            current = String::new();

            let title = trimmed[level..].trim().to_string();
            headers.insert(format!("h{level}"), title);
            // A new heading invalidates deeper levels of the old path.
            for deeper in (level + 1)..=3 {
                headers.remove(&format!("h{deeper}"));
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(Section {
            text: current.trim_end().to_string(),
            headers,
        });
    }

    if sections.is_empty() {
        sections.push(Section {
            text: text.to_string(),
            headers: BTreeMap::new(),
        });
    }
    sections
}

/// Break text into pieces no larger than `max_chars`, preferring the
/// earliest separator in `separators` that appears. Separators stay attached
/// to the preceding piece.
fn split_pieces(text: &str, max_chars: usize, separators: &[&str]) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let Some((separator, rest)) = separators.split_first() else {
        return vec![text.to_string()];
    };

    if separator.is_empty() {
        // Hard split on character boundaries.
        let mut pieces = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            current.push(c);
            if current.len() >= max_chars {
                pieces.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        return pieces;
    }

    if !text.contains(separator) {
        return split_pieces(text, max_chars, rest);
    }

    let mut pieces = Vec::new();
    for part in split_inclusive_str(text, separator) {
        if part.len() > max_chars {
            pieces.extend(split_pieces(&part, max_chars, rest));
        } else {
            pieces.push(part);
        }
    }
    pieces
}

fn split_inclusive_str(text: &str, separator: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remainder = text;
    while let Some(position) = remainder.find(separator) {
        let end = position + separator.len();
        parts.push(remainder[..end].to_string());
        remainder = &remainder[end..];
    }
    if !remainder.is_empty() {
        parts.push(remainder.to_string());
    }
    parts
}

/// Last `limit` bytes of `text`, snapped to a char boundary.
fn char_tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn generate_chunk_id(document_id: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b"_");
    hasher.update(chunk_index.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}
