
use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

/// Local models known by name, with their output width
pub const KNOWN_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1.5", 768),
];

/// Canonical name of a known local model; matching ignores case
#[inline]
pub fn canonical_model_name(name: &str) -> Option<&'static str> {
    let name = name.trim_start_matches("sentence-transformers/");
    KNOWN_MODELS
        .iter()
        .map(|(known, _)| *known)
        .find(|known| known.eq_ignore_ascii_case(name))
}

#[cfg(feature = "local-embeddings")]
fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel;

    match canonical_model_name(name) {
        Some("all-MiniLM-L6-v2") => Ok(EmbeddingModel::AllMiniLML6V2),
        Some("all-MiniLM-L12-v2") => Ok(EmbeddingModel::AllMiniLML12V2),
        Some("bge-small-en-v1.5") => Ok(EmbeddingModel::BGESmallENV15),
        Some("bge-base-en-v1.5") => Ok(EmbeddingModel::BGEBaseENV15),
        Some("bge-large-en-v1.5") => Ok(EmbeddingModel::BGELargeENV15),
        Some("nomic-embed-text-v1.5") => Ok(EmbeddingModel::NomicEmbedTextV15),
        _ => Err(RagError::Configuration(format!(
            "Unknown local embedding model '{name}'. Supported: {}",
            KNOWN_MODELS
                .iter()
                .map(|(known, _)| *known)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// In-process embedding model.
///
/// The model runs on the blocking pool behind a mutex; its dimension is probed
/// once when the model is loaded.
pub struct LocalProvider {
    #[cfg(feature = "local-embeddings")]
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalProvider {
    /// Load the configured model, downloading it into the cache on first use
    #[cfg(feature = "local-embeddings")]
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        use std::sync::{Arc, Mutex};
        use tracing::info;

        let model_name = config.local.model.clone();
        let model_enum = resolve_model(&model_name)?;

        let mut init = fastembed::InitOptions::new(model_enum).with_show_download_progress(false);
        if let Some(cache_dir) = config
            .local
            .cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("repo-rag").join("models")))
        {
            init = init.with_cache_dir(cache_dir);
        }

        let mut text_embedding = fastembed::TextEmbedding::try_new(init).map_err(|e| {
            RagError::ProviderUnavailable(format!("Failed to load local model {model_name}: {e}"))
        })?;

        let probe = text_embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| RagError::Embedding(format!("Failed to probe model dimension: {e}")))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| RagError::Embedding("Empty probe embedding".to_string()))?;

        info!("Loaded local model {} ({} dimensions)", model_name, dimension);

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            dimension,
        })
    }

    /// Built without the `local-embeddings` feature: always unavailable
    #[cfg(not(feature = "local-embeddings"))]
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Err(RagError::ProviderUnavailable(format!(
            "Local model {} requested, but repo-rag was built without the \
             `local-embeddings` feature",
            config.local.model
        )))
    }

    #[inline]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[cfg(feature = "local-embeddings")]
    async fn run_model(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = std::sync::Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| RagError::Embedding(format!("Model lock poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| RagError::Embedding(format!("Local embedding failed: {e}")))
        })
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Embedding task failed: {e}")))?
    }

    #[cfg(not(feature = "local-embeddings"))]
    async fn run_model(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(RagError::ProviderUnavailable(
            "local embeddings are not compiled in".to_string(),
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.run_model(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Local model returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.run_model(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "local"
    }
}
