//! Best-effort webhook delivery.

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tracing::{error, info, warn};

use super::SlackMessage;
use crate::config::WebhookConfig;

/// Result of one delivery attempt. Delivery problems are reported here and
/// never as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// No endpoint configured.
    Skipped,
    Failed(String),
}

/// Destination for rendered alerts.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &SlackMessage) -> SendOutcome;
}

/// POSTs messages as JSON to an incoming-webhook URL.
pub struct WebhookSender {
    client: Client,
    url: Option<String>,
}

impl WebhookSender {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSender {
    async fn send(&self, message: &SlackMessage) -> SendOutcome {
        let Some(url) = &self.url else {
            warn!("Webhook URL not set, skipping notification");
            return SendOutcome::Skipped;
        };

        let response = match self.client.post(url).json(message).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to send notification: {}", e);
                return SendOutcome::Failed(e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            info!("Notification sent successfully");
            return SendOutcome::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Webhook rejected notification");
        SendOutcome::Failed(format!("webhook returned {}", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::message::{Block, TextObject};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> SlackMessage {
        SlackMessage {
            blocks: vec![
                Block::Header {
                    text: TextObject::PlainText {
                        text: "WARNING Test Failures".to_string(),
                        emoji: true,
                    },
                },
                Block::Divider,
            ],
        }
    }

    fn sender(url: Option<String>) -> WebhookSender {
        WebhookSender::new(&WebhookConfig {
            url,
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/T000"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "blocks": [{ "type": "header" }, { "type": "divider" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = sender(Some(format!("{}/hooks/T000", server.uri()))).send(&message()).await;
        assert_eq!(outcome, SendOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let outcome = sender(Some(server.uri())).send(&message()).await;
        assert!(matches!(outcome, SendOutcome::Failed(ref reason) if reason.contains("404")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_reported_not_raised() {
        // Nothing listens on port 9 on loopback.
        let outcome = sender(Some("http://127.0.0.1:9/hook".to_string())).send(&message()).await;
        assert!(matches!(outcome, SendOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let outcome = sender(Some(server.uri())).send(&message()).await;
        assert!(matches!(outcome, SendOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_is_skipped() {
        let s = sender(Some("  ".to_string()));
        assert!(!s.is_configured());
        assert_eq!(s.send(&message()).await, SendOutcome::Skipped);
    }
}
