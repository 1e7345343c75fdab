// Embeddings module
// Content chunking and the embedding provider abstraction

pub mod chunking;
pub mod cohere;
pub mod http;
pub mod local;
pub mod openai;


use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

pub use chunking::{ChunkingConfig, CodeLanguage, Metadata, TextChunk, TextChunker};
pub use cohere::CohereProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;

/// Turns text into fixed-length vectors.
///
/// Every vector produced by one provider has exactly [`dimension`] entries.
///
/// [`dimension`]: EmbeddingProvider::dimension
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the output order matches the input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Build the provider named by `config.provider`
#[inline]
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "cohere" => Ok(Arc::new(CohereProvider::new(config)?)),
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        other => Err(RagError::Configuration(format!(
            "Unknown embedding provider '{other}' (expected 'openai', 'cohere' or 'local')"
        ))),
    }
}

/// Fail unless every vector has the expected length
pub(crate) fn check_dimensions(embeddings: &[Vec<f32>], expected: usize) -> Result<()> {
    match embeddings.iter().find(|e| e.len() != expected) {
        Some(wrong) => Err(RagError::Embedding(format!(
            "provider returned a {}-dimensional vector, expected {}",
            wrong.len(),
            expected
        ))),
        None => Ok(()),
    }
}
