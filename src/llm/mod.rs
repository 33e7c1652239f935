//! Text-generation capability used by the debate stages
//! Provides an OpenAI-compatible chat completions client with explicit error classes

pub mod parse;
pub mod retry;

pub use parse::{parse_structured_result, ParseError};
pub use retry::{with_retry, RetryPolicy};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::config::LlmConfig;

/// Failure classes surfaced by a text generator
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited by provider (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("provider returned status {status_code}: {message}")]
    Api { status_code: u16, message: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("provider response is not a chat completion: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Rate limits, network failures and timeouts are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout { .. }
        )
    }

    /// Delay suggested by the provider, if any
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after: Some(secs) } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Generated text with the optional reasoning trace some models return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub reasoning: Option<String>,
}

/// Opaque text generation. Callers treat every reply as untrusted text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError>;

    async fn generate_with_reasoning(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, LlmError>;
}

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
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Chat completions client. One instance is built at start-up and shared.
#[derive(Debug, Clone)]
pub struct LLMClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    reasoning_model: String,
    timeout_seconds: u64,
}

impl LLMClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).context("Invalid LLM_BASE_URL")?;
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            base.as_str().trim_end_matches('/')
        ))
        .context("Invalid chat completions endpoint")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("debatedesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        info!(endpoint = %endpoint, model = %config.model, "LLM client configured");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            reasoning_model: config.reasoning_model.clone(),
            timeout_seconds: config.timeout_seconds,
        })
    }

    async fn complete(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<Generation, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": model,
            "messages": messages,
        });

        debug!(model, prompt_chars = prompt.len(), "Sending chat completion request");

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_seconds: self.timeout_seconds,
                }
            } else {
                LlmError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = status.as_u16(), "Chat completion request failed");
            return Err(LlmError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(format!("failed to read response body: {}", e)))?;

        decode_completion(&body)
    }
}

/// A body that arrived intact but has the wrong shape is final for the call
fn decode_completion(body: &str) -> Result<Generation, LlmError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or(LlmError::EmptyResponse)?;

    let text = message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    Ok(Generation {
        text,
        reasoning: message.reasoning_content.filter(|r| !r.trim().is_empty()),
    })
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        self.complete(&self.model, prompt, system)
            .await
            .map(|g| g.text)
    }

    async fn generate_with_reasoning(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, LlmError> {
        self.complete(&self.reasoning_model, prompt, system).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimited { retry_after: None }.is_transient());
        assert!(LlmError::Network("reset".to_string()).is_transient());
        assert!(LlmError::Timeout { timeout_seconds: 5 }.is_transient());
        assert!(!LlmError::Api { status_code: 500, message: String::new() }.is_transient());
        assert!(!LlmError::EmptyResponse.is_transient());
        assert!(!LlmError::MalformedResponse("missing field".to_string()).is_transient());
    }

    #[test]
    fn test_suggested_delay() {
        let err = LlmError::RateLimited { retry_after: Some(7) };
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(7)));
        assert_eq!(LlmError::RateLimited { retry_after: None }.suggested_delay(), None);
    }

    #[test]
    fn test_client_builds_endpoint() {
        let config = LlmConfig {
            base_url: "https://example.test/v1/".to_string(),
            ..crate::config::Config::default().llm
        };
        let client = LLMClient::new(&config).unwrap();
        assert_eq!(client.endpoint.as_str(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn test_unexpected_body_is_malformed() {
        let err = decode_completion(r#"{"error_shape":"not a chat completion"}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));

        let err = decode_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_malformed_body_is_attempted_once() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result = with_retry(&policy, "test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            decode_completion(r#"{"error_shape":"not a chat completion"}"#)
        })
        .await;

        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chat_response_with_reasoning() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}","reasoning_content":"step 1"}}]}"#;
        let generation = decode_completion(body).unwrap();
        assert_eq!(generation.text, "{}");
        assert_eq!(generation.reasoning.as_deref(), Some("step 1"));
    }
}
