#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// Free-form per-file metadata carried by every chunk and stored as JSON
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Sections of source code shorter than this are treated as noise
const MIN_CODE_SECTION_CHARS: usize = 50;
const PARAGRAPH_SEARCH_RADIUS: usize = 100;
const SENTENCE_SEARCH_RADIUS: usize = 50;
const LINE_SEARCH_RADIUS: usize = 50;

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6} ").expect("heading pattern is valid"));
static PYTHON_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:class|def|async def) ").expect("python pattern is valid")
});
static SWIFT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:class|struct|enum|func|extension|protocol) ")
        .expect("swift pattern is valid")
});
static SCRIPT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:class |function |const \w+ = |export |interface |type )")
        .expect("script pattern is valid")
});
static RUST_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^(?:pub(?:\([^)]*\))?[ \t]+)?",
        r#"(?:(?:async|const|unsafe|extern(?:[ \t]+"[^"]*")?)[ \t]+)*"#,
        r"(?:(?:fn|struct|enum|trait|impl|mod|type|const|static)\b|macro_rules!)",
    ))
    .expect("rust pattern is valid")
});

/// A contiguous span of source text ready for embedding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    /// Trimmed, non-empty chunk text
    pub text: String,
    /// Path of the source file relative to the repository root
    pub source_path: String,
    /// Position of this chunk within its file, starting at 0
    pub chunk_index: u32,
    /// Character offset where the chunk's span starts
    pub start_offset: usize,
    /// Character offset where the chunk's span ends (exclusive)
    pub end_offset: usize,
    pub metadata: Metadata,
}

/// Chunk size settings, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Width of the splitting window
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Language families that get declaration-aware splitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Python,
    Swift,
    Script,
    Rust,
}

impl CodeLanguage {
    #[inline]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "py" => Some(Self::Python),
            "swift" => Some(Self::Swift),
            "js" | "jsx" | "ts" | "tsx" => Some(Self::Script),
            "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    fn declaration_pattern(self) -> &'static Regex {
        match self {
            Self::Python => &PYTHON_DECLARATION,
            Self::Swift => &SWIFT_DECLARATION,
            Self::Script => &SCRIPT_DECLARATION,
            Self::Rust => &RUST_DECLARATION,
        }
    }
}

/// Splits file content into overlapping, boundary-aware chunks
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// The overlap must be smaller than the chunk size so every window advances
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }

    #[inline]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub const fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text with the character-budgeted sliding window
    #[inline]
    pub fn chunk(&self, text: &str, source_path: &str, metadata: &Metadata) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut next_index = 0;
        self.split_by_budget(
            text,
            0,
            &mut next_index,
            source_path,
            metadata,
            &mut chunks,
        );
        chunks
    }

    /// Split text along its structure, chosen by the file extension of `source_path`
    #[inline]
    pub fn chunk_by_structure(
        &self,
        text: &str,
        source_path: &str,
        metadata: &Metadata,
    ) -> Vec<TextChunk> {
        let extension = Path::new(source_path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let chunks = if extension == "md" || extension == "markdown" {
            self.chunk_markdown(text, source_path, metadata)
        } else if let Some(language) = CodeLanguage::from_extension(&extension) {
            self.chunk_code(text, language, source_path, metadata)
        } else {
            self.chunk(text, source_path, metadata)
        };

        debug!(
            "Chunked {} into {} chunks ({} chars)",
            source_path,
            chunks.len(),
            text.len()
        );
        chunks
    }

    /// One chunk per heading section, no re-splitting
    fn chunk_markdown(&self, text: &str, source_path: &str, metadata: &Metadata) -> Vec<TextChunk> {
        if !MARKDOWN_HEADING.is_match(text).unwrap_or(false) {
            return self.chunk(text, source_path, metadata);
        }

        let mut chunks = Vec::new();
        for section in split_sections(text, &MARKDOWN_HEADING) {
            let trimmed = section.text.trim();
            if trimmed.is_empty() {
                continue;
            }
            chunks.push(TextChunk {
                text: trimmed.to_string(),
                source_path: source_path.to_string(),
                chunk_index: chunks.len() as u32,
                start_offset: section.start_offset,
                end_offset: section.end_offset,
                metadata: metadata.clone(),
            });
        }

        if chunks.is_empty() {
            return self.chunk(text, source_path, metadata);
        }
        chunks
    }

    /// One chunk per top-level declaration; oversized declarations are re-split
    fn chunk_code(
        &self,
        text: &str,
        language: CodeLanguage,
        source_path: &str,
        metadata: &Metadata,
    ) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut next_index = 0;

        for section in split_sections(text, language.declaration_pattern()) {
            let trimmed = section.text.trim();
            let trimmed_len = trimmed.chars().count();
            if trimmed_len < MIN_CODE_SECTION_CHARS {
                continue;
            }

            if trimmed_len > self.chunk_size {
                self.split_by_budget(
                    section.text,
                    section.start_offset,
                    &mut next_index,
                    source_path,
                    metadata,
                    &mut chunks,
                );
            } else {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    source_path: source_path.to_string(),
                    chunk_index: next_index,
                    start_offset: section.start_offset,
                    end_offset: section.end_offset,
                    metadata: metadata.clone(),
                });
                next_index += 1;
            }
        }

        if chunks.is_empty() {
            return self.chunk(text, source_path, metadata);
        }
        chunks
    }

    /// Sliding-window splitter; offsets are shifted by `base_offset`
    fn split_by_budget(
        &self,
        text: &str,
        base_offset: usize,
        next_index: &mut u32,
        source_path: &str,
        metadata: &Metadata,
        out: &mut Vec<TextChunk>,
    ) {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return;
        }

        let mut start = 0;
        loop {
            let window_end = (start + self.chunk_size).min(len);
            let end = if window_end < len {
                self.snap_to_boundary(&chars, start, window_end)
            } else {
                window_end
            };

            let span: String = chars[start..end].iter().collect();
            let trimmed = span.trim();
            if !trimmed.is_empty() {
                out.push(TextChunk {
                    text: trimmed.to_string(),
                    source_path: source_path.to_string(),
                    chunk_index: *next_index,
                    start_offset: base_offset + start,
                    end_offset: base_offset + end,
                    metadata: metadata.clone(),
                });
                *next_index += 1;
            }

            if end >= len {
                break;
            }
            start = end - self.chunk_overlap;
        }
    }

    /// Move a window boundary onto a paragraph, sentence or line break nearby.
    ///
    /// A candidate cut must stay beyond `start + overlap` so the next window
    /// starts strictly after the current one.
    fn snap_to_boundary(&self, chars: &[char], start: usize, end: usize) -> usize {
        let len = chars.len();
        let min_cut = start + self.chunk_overlap + 1;
        let candidates: [(&[char], usize); 3] = [
            (&['\n', '\n'], PARAGRAPH_SEARCH_RADIUS),
            (&['.', ' '], SENTENCE_SEARCH_RADIUS),
            (&['\n'], LINE_SEARCH_RADIUS),
        ];

        for (needle, radius) in candidates {
            let lower = end.saturating_sub(radius).max(start);
            let upper = (end + radius).min(len);

            let mut from = lower;
            while let Some(position) = find_chars(chars, needle, from, upper) {
                let cut = position + needle.len();
                if cut >= min_cut {
                    return cut;
                }
                from = position + 1;
            }
        }

        end
    }
}

/// First occurrence of `needle` lying entirely within `chars[from..to]`
fn find_chars(chars: &[char], needle: &[char], from: usize, to: usize) -> Option<usize> {
    if to < from + needle.len() {
        return None;
    }
    (from..=to - needle.len()).find(|&i| chars[i..i + needle.len()] == *needle)
}

struct Section<'a> {
    text: &'a str,
    start_offset: usize,
    end_offset: usize,
}

/// Cut `text` immediately before every line matched by `pattern`
fn split_sections<'a>(text: &'a str, pattern: &Regex) -> Vec<Section<'a>> {
    let mut boundaries: Vec<usize> = pattern
        .find_iter(text)
        .filter_map(|found| found.ok())
        .map(|found| found.start())
        .filter(|&position| position > 0)
        .collect();
    boundaries.insert(0, 0);
    boundaries.push(text.len());
    boundaries.dedup();

    let mut sections = Vec::with_capacity(boundaries.len());
    let mut char_offset = 0;
    for window in boundaries.windows(2) {
        let section_text = text.get(window[0]..window[1]).unwrap_or_default();
        let char_len = section_text.chars().count();
        sections.push(Section {
            text: section_text,
            start_offset: char_offset,
            end_offset: char_offset + char_len,
        });
        char_offset += char_len;
    }
    sections
}
