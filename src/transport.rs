use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::error::{DispatchError, Result};
use crate::models::ChatCompletionRequest;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

/// Status and body of an HTTP exchange that reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam for the generation API.
///
/// `Err` is reserved for exchanges that never produced a status (connect
/// failures, resets, timeouts); every answered request is an `Ok`, whatever
/// its status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn chat(&self, req: &ChatCompletionRequest) -> Result<RawResponse>;
    async fn list_models(&self) -> Result<RawResponse>;
    fn has_credentials(&self) -> bool;
}

pub struct OpenAiTransport {
    client: Client,
    api_key: String,
    base_url: String,
    probe_timeout: Duration,
}

impl OpenAiTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .read_timeout(cfg.request_timeout())
            .timeout(cfg.resource_timeout())
            .user_agent(cfg.client.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: cfg.openai.api_key.clone(),
            base_url: cfg.openai.base_url.trim_end_matches('/').to_string(),
            probe_timeout: cfg.probe_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    async fn chat(&self, req: &ChatCompletionRequest) -> Result<RawResponse> {
        tracing::debug!(model = %req.model, "POST {}", CHAT_COMPLETIONS_PATH);

        let response = self
            .client
            .post(self.url(CHAT_COMPLETIONS_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(status, bytes = body.len(), "chat completion answered");
        Ok(RawResponse { status, body })
    }

    async fn list_models(&self) -> Result<RawResponse> {
        let response = self
            .client
            .get(self.url(MODELS_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(RawResponse { status, body })
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(301, "").is_success());
        assert!(!RawResponse::new(429, "").is_success());
    }

    #[test]
    fn test_urls_join_base_without_double_slash() {
        let mut cfg = Config::default();
        cfg.openai.base_url = "http://localhost:8080/".to_string();
        cfg.openai.api_key = "sk-test".to_string();
        let transport = OpenAiTransport::new(&cfg).unwrap();
        assert_eq!(
            transport.url(CHAT_COMPLETIONS_PATH),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(transport.url(MODELS_PATH), "http://localhost:8080/v1/models");
        assert!(transport.has_credentials());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let mut cfg = Config::default();
        // Port 9 on localhost refuses connections on any sane test host
        cfg.openai.base_url = "http://127.0.0.1:9".to_string();
        let transport = OpenAiTransport::new(&cfg).unwrap();
        let err = transport.list_models().await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(!transport.has_credentials());
    }
}
