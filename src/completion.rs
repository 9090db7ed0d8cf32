//! Completion service client
//!
//! The relay only needs "prompt in, text out". `HttpCompletionClient` talks to a
//! backend that accepts `{"prompt", "conversation_id"}` and answers `{"message"}`.

use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failed completion call
#[derive(Error, Debug, Clone, PartialEq)]
#[error("code {}: {message}", status_label(.status))]
pub struct CompletionError {
    /// HTTP status when the backend answered, None for transport failures and timeouts
    pub status: Option<u16>,
    pub message: String,
}

impl CompletionError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

pub(crate) fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Sends a prompt to a completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    conversation_id: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    message: Option<String>,
}

/// JSON-over-HTTP completion client
pub struct HttpCompletionClient {
    client: reqwest::Client,
    url: String,
    conversation_id: String,
    timeout: Duration,
}

impl HttpCompletionClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.completion_url.clone(),
            conversation_id: config.conversation_id.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = CompletionRequest {
            prompt,
            conversation_id: &self.conversation_id,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::transport(format!("timed out after {:?}", self.timeout))
                } else {
                    CompletionError::transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Completion backend returned {}: {}", status, text);
            return Err(CompletionError::http(status.as_u16(), text));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            CompletionError::http(status.as_u16(), format!("invalid response body: {}", e))
        })?;

        let message = parsed.message.unwrap_or_default().trim().to_string();
        tracing::info!("Bot says: {}", message);
        Ok(message)
    }
}
