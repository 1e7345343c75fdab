#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{JsonClient, parse_response, require_api_key};
use super::{EmbeddingProvider, check_dimensions};
use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// OpenAI `/v1/embeddings` backend
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: JsonClient,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    /// Requires `OPENAI_API_KEY`; fails before any network traffic without it
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_api_key(config.openai_api_key.as_deref(), "OPENAI_API_KEY")?;
        let client = JsonClient::new(&config.openai.base_url, api_key)?
            .with_retry_attempts(config.retry_attempts)
            .with_timeout(Duration::from_secs(config.timeout_seconds));

        Ok(Self {
            client,
            model: config.openai.model.clone(),
            dimension: model_dimension(&config.openai.model),
        })
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.client = self.client.with_backoff(backoff);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Output width of an OpenAI embedding model, judged by its name
#[inline]
pub fn model_dimension(model: &str) -> usize {
    if model.contains("3-small") || model.contains("ada-002") {
        1536
    } else {
        3072
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::Embedding("OpenAI returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} OpenAI embeddings with {}", texts.len(), self.model);

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to encode request: {e}")))?;

        let response_text = self.client.post_json(EMBEDDINGS_PATH, body).await?;
        let mut response: EmbedResponse = parse_response(&response_text, "OpenAI embeddings")?;

        if response.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        check_dimensions(&embeddings, self.dimension)?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }
}
