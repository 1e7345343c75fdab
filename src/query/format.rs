use std::fmt::Write as _;

use crate::database::SearchResult;
use crate::{RagError, Result};

/// Views over a result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
    Llm,
}

impl std::str::FromStr for OutputFormat {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "llm" => Ok(Self::Llm),
            other => Err(RagError::Configuration(format!(
                "Unknown output format '{other}' (expected text, json, markdown or llm)"
            ))),
        }
    }
}

const RULE_WIDTH: usize = 60;

#[inline]
pub fn format_results(results: &[SearchResult], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(results)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to encode results: {e}"))),
        OutputFormat::Markdown => Ok(format_markdown(results)),
        OutputFormat::Llm => Ok(format_llm(results)),
        OutputFormat::Text => Ok(format_text(results)),
    }
}

fn format_markdown(results: &[SearchResult]) -> String {
    let mut output = String::from("# Query Results\n\n");
    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(output, "## Result {}", i + 1);
        let _ = writeln!(output, "**File:** `{}`", result.source_path);
        let _ = writeln!(output, "**Chunk:** {}", result.chunk_index);
        let _ = writeln!(output, "**Similarity:** {:.3}", result.similarity());
        let _ = write!(output, "\n{}\n\n---\n\n", result.text);
    }
    output
}

fn format_llm(results: &[SearchResult]) -> String {
    let mut output = String::from("# Relevant Repository Context\n\n");
    for (i, result) in results.iter().enumerate() {
        let _ = write!(
            output,
            "## Source {}: {}\n\n```\n{}\n```\n\n",
            i + 1,
            result.source_path,
            result.text
        );
    }
    output
}

fn format_text(results: &[SearchResult]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        let _ = write!(output, "\n{rule}\nResult {}/{}\n{rule}\n", i + 1, results.len());
        let _ = writeln!(output, "File: {}", result.source_path);
        let _ = writeln!(output, "Chunk: {}", result.chunk_index);
        let _ = writeln!(output, "Similarity: {:.3}", result.similarity());
        let _ = writeln!(output, "\n{}", result.text);
    }
    let _ = writeln!(output, "\n{rule}");
    output
}
