//! Client for OpenAI-compatible chat endpoints, used for paraphrasing.
//!
//! Epistemic foundation:
//! - K_i: OpenAI API schema is the de facto standard
//! - K_i: Aggregators and on-prem servers (vLLM, Ollama) all support it
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::models::{ColloquyError, ParaphraseConfig, ParaphraseError, Result};
use crate::nlp::Paraphraser;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

const PARAPHRASE_INSTRUCTION: &str = "Rewrite the user's text in different words while keeping \
its meaning. Keep theological terms such as Christ, God, Holy Spirit, salvation, faith and grace. \
Reply with the rewritten text only.";

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat client for one OpenAI-compatible endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    /// API key (None for local endpoints without auth)
    api_key: Option<String>,
    /// Base URL for the API
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    /// Request timeout
    timeout: Duration,
    /// Maximum attempts per request
    max_retries: u32,
}

impl LlmClient {
    /// Create a client from the paraphrase section of the config.
    pub fn new(config: &ParaphraseConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ColloquyError::Network)?;

        Ok(Self {
            client,
            api_key: config.resolve_api_key()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            max_retries: config.max_retries.max(1),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Complete a chat request.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    /// I^B(transient failures) → exponential backoff, rate limits honor Retry-After
    pub async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<ColloquyError> = None;

        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;

            let response = match self
                .client
                .post(&url)
                .headers(self.headers())
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ColloquyError::Timeout(self.timeout)
                    } else {
                        ColloquyError::Network(e)
                    });
                    if !is_last {
                        let backoff = backoff(attempt);
                        debug!(attempt, backoff_secs = backoff.as_secs(), "Retrying after network error");
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);
                last_error = Some(ParaphraseError::RateLimited { retry_after_secs: retry_after }.into());
                if !is_last {
                    debug!(attempt, retry_after_secs = retry_after, "Rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = ColloquyError::from(classify_failure(status, &body));
                if !error.is_retryable() {
                    debug!(status, error = %error, "Not retrying client error");
                    return Err(error);
                }
                last_error = Some(error);
                if !is_last {
                    let backoff = backoff(attempt);
                    debug!(attempt, status, backoff_secs = backoff.as_secs(), "Retrying after server error");
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                ParaphraseError::InvalidResponse(format!("Failed to parse response: {e}"))
            })?;
            return body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| ParaphraseError::InvalidResponse("No choices in response".into()).into());
        }

        Err(last_error.unwrap_or_else(|| {
            ParaphraseError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            }
            .into()
        }))
    }
}

/// Exponential backoff: 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Map a non-success HTTP status and body to a typed error.
fn classify_failure(status: u16, body: &str) -> ParaphraseError {
    if status == 401 || status == 403 {
        return ParaphraseError::AuthenticationFailed;
    }
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    ParaphraseError::ApiError { status, message }
}

/// Paraphraser backed by a chat endpoint.
///
/// `paraphrase` blocks on the runtime handle, so it must be called from a
/// blocking thread (the worker pool runs items under `spawn_blocking`).
pub struct LlmParaphraser {
    client: Arc<LlmClient>,
    handle: Handle,
}

impl LlmParaphraser {
    pub fn new(client: Arc<LlmClient>, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl Paraphraser for LlmParaphraser {
    fn paraphrase(&self, text: &str) -> Result<String> {
        let messages = [Message::system(PARAPHRASE_INSTRUCTION), Message::user(text)];
        self.handle.block_on(self.client.complete(&messages))
    }
}
