//! Redemption code consumption against the remote ticket service

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Verdict of the ticket service
#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    Accepted,
    /// Code unknown, not activated today, or already used
    Rejected { code: i64, message: String },
}

/// Consumes a redemption code remotely
#[async_trait]
pub trait RedemptionClient: Send + Sync {
    async fn redeem(&self, code: &str) -> Result<RedemptionOutcome>;
}

#[derive(Deserialize)]
struct TicketResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Form-encoded HTTP ticket client
pub struct HttpRedemptionClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRedemptionClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.redemption_url.clone(),
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
impl RedemptionClient for HttpRedemptionClient {
    async fn redeem(&self, code: &str) -> Result<RedemptionOutcome> {
        // The ticket service names its key field `userId`
        let response = self
            .client
            .post(&self.url)
            .form(&[("userId", code)])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Redemption(format!(
                "ticket service returned {}",
                status
            )));
        }

        let ticket: TicketResponse = response.json().await?;
        tracing::info!(code = ticket.code, message = ?ticket.message, "Ticket service answered");

        if ticket.code == 0 {
            Ok(RedemptionOutcome::Accepted)
        } else {
            Ok(RedemptionOutcome::Rejected {
                code: ticket.code,
                message: ticket.message.unwrap_or_default(),
            })
        }
    }
}
