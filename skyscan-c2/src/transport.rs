//! Outbound publishing of pointing commands, ledgers, and heartbeats.
//!
//! The service depends only on the `Transport` trait. `WebhookTransport`
//! POSTs each message as JSON to `<base_url>/<topic>`; `LogTransport` writes
//! messages to the log when no downstream is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Upper bound on a single webhook publish.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("publish to {topic} rejected with status {status}")]
    Rejected { topic: String, status: u16 },
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Publishes messages to a webhook URL via HTTP POST.
#[derive(Clone)]
pub struct WebhookTransport {
    base_url: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(base_url: &str) -> Self {
        WebhookTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url, topic.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.topic_url(topic))
            .timeout(PUBLISH_TIMEOUT)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                topic: topic.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Writes every message to the log at info level.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), TransportError> {
        tracing::info!(topic, %payload, "publish");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
