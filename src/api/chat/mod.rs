#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::embeddings::http::{JsonClient, parse_response, require_api_key};
use crate::{RagError, Result};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const SYSTEM_PROMPT: &str = "You are a helpful coding assistant.";

/// Model used for answers when none is requested
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";

/// Single-turn text completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;
}

/// OpenAI `/v1/chat/completions` backend
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: JsonClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    /// Shares the OpenAI endpoint, key and retry settings of the embedding config
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_api_key(config.openai_api_key.as_deref(), "OPENAI_API_KEY")?;
        let client = JsonClient::new(&config.openai.base_url, api_key)?
            .with_retry_attempts(config.retry_attempts)
            .with_timeout(Duration::from_secs(config.timeout_seconds));
        Ok(Self { client })
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.client = self.client.with_backoff(backoff);
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to encode chat request: {e}")))?;

        debug!("Requesting chat completion from {}", model);
        let response = self.client.post_json(CHAT_COMPLETIONS_PATH, body).await?;
        let parsed: ChatResponse = parse_response(&response, "chat completion")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::Other(anyhow::anyhow!("Chat completion returned no content")))
    }
}
