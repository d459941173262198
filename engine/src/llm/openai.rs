//! OpenAI-compatible chat completions provider
//!
//! Implements the ChatModel trait against the `/chat/completions` endpoint.
//! Works with any OpenAI-compatible server by pointing `base_url` elsewhere.
//! The API key is read from the environment by the caller, never from config.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatModel, CompletionError, Message, Result};
use crate::config::ModelConfig;

/// Request timeout for completion calls
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
    client: Client,
}

impl OpenAiModel {
    /// Create a new provider from config plus the API key.
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: api_key.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
        };

        tracing::debug!(
            "Completion request: model={}, messages={}",
            self.model,
            request.messages.len()
        );

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else if e.is_connect() {
                    CompletionError::ProviderUnavailable(format!(
                        "Cannot connect to model provider at {}",
                        self.base_url
                    ))
                } else {
                    CompletionError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CompletionError::AuthenticationFailed(
                "Provider rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::ProviderUnavailable(format!(
                "Provider API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            CompletionError::ParseError(format!("Failed to parse completion response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                CompletionError::ParseError("Completion response had no choices".to_string())
            })?;

        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ModelConfig {
        ModelConfig {
            base_url: base_url.to_string(),
            model: "gpt-4o".to_string(),
            temperature: 1.0,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "It is sunny."}}]
            })))
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&test_config(&server.uri()), "test-key");
        let answer = model.complete(&[Message::user("weather?")]).await.unwrap();
        assert_eq!(answer, "It is sunny.");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&test_config(&server.uri()), "bad-key");
        let err = model.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, CompletionError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let model = OpenAiModel::new(&test_config(&server.uri()), "test-key");
        let err = model.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, CompletionError::ProviderUnavailable(_)));
    }
}
