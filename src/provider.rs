use crate::config::OpenAiConfig;
use crate::logging::{self, LogCategory};
use crate::stream::{sse_fragments, FragmentStream};
use crate::log_debug;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A language model that answers a conversation as a stream of text fragments
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Open a streamed completion. Errors before the first byte are returned
    /// here; errors after that arrive as items of the stream.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;

    /// Model name for logging/display purposes
    fn model_name(&self) -> &str;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// `timeout` bounds connecting and receiving the response headers;
    /// the body itself may stream for longer.
    pub fn new(config: &OpenAiConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        })
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let url = self.endpoint();
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| anyhow!("Request to model timed out after {:?}", self.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request to model timed out: {}", e)
                } else if e.is_connect() {
                    anyhow!("Failed to connect to {}: {}", self.base_url, e)
                } else {
                    anyhow!("Model request failed: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(error_text);
            return Err(anyhow!("Model endpoint returned {}: {}", status, message));
        }

        Ok(sse_fragments(response.bytes_stream()))
    }
}

#[async_trait]
impl ChatModel for OpenAiProvider {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let start = Instant::now();
        log_debug!(
            LogCategory::Provider,
            format!("Opening stream with {} messages", messages.len())
        );

        let result = self.open_stream(messages).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        logging::with_logger(|logger| {
            logger.log_model_request(&self.model, duration_ms, result.is_ok())
        });
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OpenAiConfig {
        OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: "https://api.example.com/v1/".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiProvider::new(&test_config(), Duration::from_secs(30));

        assert_eq!(provider.model_name(), "gpt-4o-mini");
        assert_eq!(provider.endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(provider.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_request_body() {
        let provider = OpenAiProvider::new(&test_config(), Duration::from_secs(30));
        let body = provider.request_body(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("list files"),
        ]);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "list files");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let config = OpenAiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..test_config()
        };
        let provider = OpenAiProvider::new(&config, Duration::from_secs(5));

        let result = provider.stream_chat(&[ChatMessage::user("hi")]).await;
        assert!(result.is_err());
    }
}
