
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{JsonClient, parse_response, require_api_key};
use super::{EmbeddingProvider, check_dimensions};
use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

const EMBED_PATH: &str = "/v1/embed";
pub const COHERE_DIMENSION: usize = 1024;

/// Cohere `/v1/embed` backend; documents are embedded as `search_document`
#[derive(Debug, Clone)]
pub struct CohereProvider {
    client: JsonClient,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl CohereProvider {
    /// Requires `COHERE_API_KEY`; fails before any network traffic without it
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_api_key(config.cohere_api_key.as_deref(), "COHERE_API_KEY")?;
        let client = JsonClient::new(&config.cohere.base_url, api_key)?
            .with_retry_attempts(config.retry_attempts)
            .with_timeout(Duration::from_secs(config.timeout_seconds));

        Ok(Self {
            client,
            model: config.cohere.model.clone(),
        })
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.client = self.client.with_backoff(backoff);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::Embedding("Cohere returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} Cohere embeddings with {}", texts.len(), self.model);

        let request = EmbedRequest {
            texts,
            model: &self.model,
            input_type: "search_document",
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to encode request: {e}")))?;

        let response_text = self.client.post_json(EMBED_PATH, body).await?;
        let response: EmbedResponse = parse_response(&response_text, "Cohere embed")?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        check_dimensions(&response.embeddings, COHERE_DIMENSION)?;

        Ok(response.embeddings)
    }

    fn dimension(&self) -> usize {
        COHERE_DIMENSION
    }

    fn name(&self) -> &str {
        "cohere"
    }
}
