use std::time::Duration;

use tracing::{debug, error, warn};
use url::Url;

use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Blocking JSON-over-HTTP client with retry, shared by the remote providers
#[derive(Debug, Clone)]
pub struct JsonClient {
    base_url: Url,
    agent: ureq::Agent,
    api_key: String,
    retry_attempts: u32,
    backoff: Duration,
}

impl JsonClient {
    #[inline]
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            RagError::Configuration(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            base_url,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            api_key,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Total attempts per request; 1 disables retries
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles for every further retry
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST `body` as JSON to `path` and return the response body.
    ///
    /// Runs on the blocking pool so it can be awaited from async code.
    #[inline]
    pub async fn post_json(&self, path: &str, body: String) -> Result<String> {
        let client = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || client.post_json_blocking(&path, &body))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("HTTP worker task failed: {e}")))?
    }

    fn post_json_blocking(&self, path: &str, body: &str) -> Result<String> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RagError::Configuration(format!("Failed to build URL for {path}: {e}")))?;
        let authorization = format!("Bearer {}", self.api_key);

        debug!("POST {} ({} bytes)", url, body.len());

        self.make_request_with_retry(url.as_str(), || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", &authorization)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, url: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(RagError::Embedding(format!(
                                "{url} rejected the request: HTTP {status}"
                            )));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(RagError::Embedding(format!(
                                "Request to {url} failed: {error}"
                            )));
                        }
                    }

                    last_error = Some(error.to_string());

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32;
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(RagError::ProviderUnavailable(format!(
            "{url} unreachable after {} attempts: {}",
            self.retry_attempts,
            last_error.unwrap_or_else(|| "no response".to_string())
        )))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Reject a missing or blank API key before any request is made
pub(crate) fn require_api_key(key: Option<&str>, variable: &str) -> Result<String> {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(RagError::Configuration(format!(
            "{variable} is not set; export it to use this provider"
        ))),
    }
}

/// Decode a JSON response body, mapping malformed payloads to embedding errors
pub(crate) fn parse_response<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| RagError::Embedding(format!("Malformed {what} response: {e}")))
}
