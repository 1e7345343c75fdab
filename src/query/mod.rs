// Query module
// Read path: embed the question, search, filter and format

pub mod format;


use std::sync::Arc;

use glob::Pattern;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, RetrievalConfig};
use crate::database::{SearchResult, VectorStore};
use crate::embeddings::{EmbeddingProvider, create_provider};
use crate::{RagError, Result};

pub use format::{OutputFormat, format_results};

/// Rough characters-per-token ratio used for context budgeting
pub const CHARS_PER_TOKEN: usize = 4;

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_records: usize,
    pub indexed_files: usize,
    pub files: Vec<String>,
    pub embedding_dimension: usize,
    pub embedding_provider: String,
}

/// Retrieval over an indexed repository
pub struct QueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: VectorStore,
    retrieval: RetrievalConfig,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("provider", &self.provider.name())
            .field("store", &self.store)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

impl QueryEngine {
    /// Open the configured store; a missing table means nothing was indexed yet
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let mut store = VectorStore::from_config(config).await?;
        store.open_table().await?;
        Self::with_parts(config, provider, store)
    }

    /// Use an already opened store
    #[inline]
    pub fn with_parts(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        store: VectorStore,
    ) -> Result<Self> {
        config.retrieval.validate()?;
        if let Some(dimension) = store.dimension() {
            if dimension != provider.dimension() {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: provider.dimension(),
                });
            }
        }

        Ok(Self {
            provider,
            store,
            retrieval: config.retrieval.clone(),
        })
    }

    #[inline]
    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Nearest chunks for `text`, closest first.
    ///
    /// `None` falls back to the configured `top_k` and threshold. A threshold
    /// of 0 disables similarity filtering. `file_glob` is applied after the
    /// `top_k` cut, so a narrow glob can leave fewer than `top_k` results.
    #[inline]
    pub async fn query(
        &self,
        text: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
        file_glob: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.retrieval.top_k);
        let threshold = threshold.unwrap_or(self.retrieval.similarity_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RagError::Configuration(format!(
                "similarity threshold {threshold} is outside [0, 1]"
            )));
        }

        let pattern = file_glob
            .map(|glob| {
                Pattern::new(glob).map_err(|e| RagError::FilterSyntax {
                    filter: glob.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let vector = self.provider.embed_text(text).await?;
        let mut results = self.store.search(&vector, top_k, None).await?;
        let found = results.len();

        if threshold > 0.0 {
            let max_distance = 1.0 - threshold;
            results.retain(|result| result.distance <= max_distance);
        }

        if let Some(pattern) = pattern {
            results.retain(|result| pattern.matches(&result.source_path));
        }

        debug!(
            "Query returned {} of {} candidates (top_k {}, threshold {})",
            results.len(),
            found,
            top_k,
            threshold
        );
        Ok(results)
    }

    /// Citations for a language model, within `max_tokens * 4` characters
    #[inline]
    pub async fn context_for_llm(
        &self,
        text: &str,
        max_tokens: Option<usize>,
        top_k: Option<usize>,
    ) -> Result<String> {
        let max_tokens = max_tokens.unwrap_or(self.retrieval.context_max_tokens);
        let top_k = top_k.unwrap_or(self.retrieval.context_top_k);

        let results = self.query(text, Some(top_k), None, None).await?;
        Ok(build_context(&results, max_tokens))
    }

    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        let files = self.store.list_distinct_files().await?;
        Ok(IndexStats {
            total_records: self.store.count().await?,
            indexed_files: files.len(),
            files,
            embedding_dimension: self.provider.dimension(),
            embedding_provider: self.provider.name().to_string(),
        })
    }
}

/// Greedily pack citations in rank order; stop at the first one that does not fit
#[inline]
pub fn build_context(results: &[SearchResult], max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let mut parts = Vec::new();
    let mut total_chars = 0;

    for result in results {
        let citation = format!("\n## {}\n```\n{}\n```\n", result.source_path, result.text);

        let len = citation.chars().count();
        if total_chars + len > max_chars {
            break;
        }
        total_chars += len;
        parts.push(citation);
    }

    format!("# Repository Context\n{}", parts.join("\n"))
}
