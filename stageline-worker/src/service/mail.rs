//! Mail transport
//!
//! Delivery side of the email action. The transport only accepts a
//! recipient and a body and reports success or failure; retries are not its
//! concern.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, StageError};

/// Service trait for delivering mail
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends one message
    ///
    /// # Arguments
    /// * `recipient` - Destination address
    /// * `body` - Rendered message body
    async fn send(&self, recipient: &str, body: &str) -> Result<()>;
}

/// Transport that only records deliveries in the log
///
/// Used when no relay is configured, so pipelines can be exercised end to
/// end without sending real mail.
#[derive(Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        info!(recipient, "Sending out email: {}", body);
        Ok(())
    }
}

/// Transport that hands messages to an HTTP mail relay
///
/// POSTs `{"to": ..., "body": ...}` as JSON to the relay URL.
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: Client,
    relay_url: String,
}

impl HttpMailTransport {
    /// Creates a new HTTP mail transport
    ///
    /// # Arguments
    /// * `relay_url` - Endpoint accepting delivery requests
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self::with_client(relay_url, Client::new())
    }

    /// Creates a transport with a preconfigured HTTP client (timeouts, TLS)
    pub fn with_client(relay_url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            relay_url: relay_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    to: &'a str,
    body: &'a str,
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        debug!(recipient, "Posting email to relay {}", self.relay_url);

        let response = self
            .client
            .post(&self.relay_url)
            .json(&SendMailRequest { to: recipient, body })
            .send()
            .await
            .map_err(|e| StageError::Transport(format!("relay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StageError::Transport(format!(
                "relay returned {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}
