//! Webhook transport
//!
//! Posts `{to, subject, text}` JSON to a relay (an email-to-SMS bridge or
//! similar) that performs the actual delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use super::Notifier;
use crate::error::{Result, WatchError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    subject: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, subject: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            webhook_url,
            subject,
        }
    }

    /// Post one message to the relay
    pub async fn post(&self, destination: &str, body: &str) -> Result<()> {
        let message = RelayMessage {
            to: destination,
            subject: &self.subject,
            text: body,
        };

        let resp = self.client.post(&self.webhook_url).json(&message).send().await?;
        if resp.status().is_success() {
            debug!("Webhook notification sent");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WatchError::Notification(format!("HTTP {status}: {body}")))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_plain_text(&self, destination: &str, body: &str) -> bool {
        match self.post(destination, body).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send notification: {}", e);
                false
            }
        }
    }
}
