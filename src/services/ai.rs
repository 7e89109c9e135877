//! Content suggestions from an OpenAI-compatible chat completions API.
//!
//! The default provider is Mistral. Without an API key the service answers
//! with a fixed outline instead of calling out.

use crate::config::AiConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Suggestion returned when no API key is configured.
pub const FALLBACK_SUGGESTION: &str = "(AI not configured) Try writing: Intro, Body, Conclusion.";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(String),

    #[error("AI request timed out after {0}s")]
    Timeout(u64),

    #[error("AI provider returned status {0}")]
    Status(u16),

    #[error("failed to parse AI response: {0}")]
    Parse(String),

    #[error("no AI response")]
    Empty,

    #[error("AI client configuration error: {0}")]
    Configuration(String),
}

/// Produces writing suggestions for a prompt.
#[async_trait]
pub trait AiService: Send + Sync {
    async fn suggest(&self, prompt: &str) -> Result<String, AiError>;
}

/// [`AiService`] backed by an HTTP chat completions endpoint.
#[derive(Debug)]
pub struct HttpAiService {
    client: reqwest::Client,
    config: AiConfig,
}

impl HttpAiService {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AiError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_tokens": self.config.max_tokens,
        })
    }
}

/// Pull `choices[0].message.content` out of a completions response.
fn extract_content(body: &Value) -> Result<String, AiError> {
    let choices = body
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::Parse(format!("missing choices: {body}")))?;

    let content = choices
        .first()
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(AiError::Empty);
    }
    Ok(content.to_string())
}

#[async_trait]
impl AiService for HttpAiService {
    async fn suggest(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Ok(FALLBACK_SUGGESTION.to_string()),
        };

        debug!(endpoint = %self.config.endpoint, model = %self.config.model, "sending suggestion request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.config.timeout_seconds)
                } else {
                    AiError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "AI provider returned error");
            return Err(AiError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        extract_content(&body)
    }
}

/// Canned [`AiService`] for tests and local runs.
#[derive(Debug, Clone)]
pub struct MockAiService {
    reply: Result<String, u16>,
}

impl MockAiService {
    /// Always answers with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
        }
    }

    /// Always fails as if the provider answered with `status`.
    pub fn failing(status: u16) -> Self {
        Self { reply: Err(status) }
    }
}

#[async_trait]
impl AiService for MockAiService {
    async fn suggest(&self, _prompt: &str) -> Result<String, AiError> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(AiError::Status(*status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    async fn spawn_provider(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn config(endpoint: String, api_key: Option<&str>) -> AiConfig {
        AiConfig {
            endpoint,
            api_key: api_key.map(str::to_string),
            timeout_seconds: 5,
            ..AiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fallback_without_key() {
        let service = HttpAiService::new(config("http://127.0.0.1:9/unused".into(), None)).unwrap();
        assert_eq!(service.suggest("rust").await.unwrap(), FALLBACK_SUGGESTION);

        let blank = HttpAiService::new(config("http://127.0.0.1:9/unused".into(), Some("  "))).unwrap();
        assert_eq!(blank.suggest("rust").await.unwrap(), FALLBACK_SUGGESTION);
    }

    #[tokio::test]
    async fn test_returns_first_choice() {
        let endpoint = spawn_provider(
            StatusCode::OK,
            json!({"choices": [{"message": {"role": "assistant", "content": "Write about ownership."}}]}),
        )
        .await;
        let service = HttpAiService::new(config(endpoint, Some("key"))).unwrap();
        assert_eq!(service.suggest("rust").await.unwrap(), "Write about ownership.");
    }

    #[tokio::test]
    async fn test_error_status() {
        let endpoint = spawn_provider(StatusCode::UNAUTHORIZED, json!({"message": "bad key"})).await;
        let service = HttpAiService::new(config(endpoint, Some("key"))).unwrap();
        assert!(matches!(service.suggest("rust").await, Err(AiError::Status(401))));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let endpoint = spawn_provider(StatusCode::OK, json!({"choices": []})).await;
        let service = HttpAiService::new(config(endpoint, Some("key"))).unwrap();
        assert!(matches!(service.suggest("rust").await, Err(AiError::Empty)));
    }

    #[test]
    fn test_extract_content_requires_choices() {
        assert!(matches!(extract_content(&json!({})), Err(AiError::Parse(_))));
        assert!(matches!(
            extract_content(&json!({"choices": [{"message": {"content": ""}}]})),
            Err(AiError::Empty)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let service = HttpAiService::new(AiConfig::default()).unwrap();
        let body = service.request_body("topic");
        assert_eq!(body["model"], "mistral-medium");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["content"], "topic");
    }

    #[tokio::test]
    async fn test_mock_service() {
        assert_eq!(MockAiService::replying("ok").suggest("x").await.unwrap(), "ok");
        assert!(matches!(
            MockAiService::failing(503).suggest("x").await,
            Err(AiError::Status(503))
        ));
    }
}
