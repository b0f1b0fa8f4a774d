//! Outbound notifications.
//!
//! The monitor only needs "send this text to that address and tell me
//! whether it went out". Delivery failures are logged and reported as
//! `false`; they never interrupt monitoring.

pub mod messages;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NotifyConfig;

pub use webhook::WebhookNotifier;

/// Plain-text message transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `body` to `destination`; `true` when the transport accepted it
    async fn send_plain_text(&self, destination: &str, body: &str) -> bool;
}

/// Stand-in used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send_plain_text(&self, _destination: &str, body: &str) -> bool {
        warn!("Notification not configured, dropping message: {}", body.lines().next().unwrap_or_default());
        false
    }
}

/// Build the notifier described by `config`.
pub fn from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config.webhook_url.as_deref().filter(|_| config.is_configured()) {
        Some(url) => {
            info!("Webhook notifications enabled");
            Arc::new(WebhookNotifier::new(url.to_string(), config.subject.clone()))
        }
        None => Arc::new(DisabledNotifier),
    }
}

/// A notifier bound to the operator's destination address.
#[derive(Clone)]
pub struct Alerts {
    notifier: Arc<dyn Notifier>,
    destination: String,
    notify_errors: bool,
}

impl Alerts {
    pub fn new(notifier: Arc<dyn Notifier>, destination: impl Into<String>) -> Self {
        Self {
            notifier,
            destination: destination.into(),
            notify_errors: true,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            notifier: from_config(config),
            destination: config.destination.clone().unwrap_or_default(),
            notify_errors: config.notify_errors,
        }
    }

    pub fn with_error_reports(mut self, enabled: bool) -> Self {
        self.notify_errors = enabled;
        self
    }

    pub async fn send(&self, body: &str) -> bool {
        self.notifier.send_plain_text(&self.destination, body).await
    }

    pub async fn signup_success(&self, club: &str, url: &str, detail: &str) -> bool {
        self.send(&messages::signup_success(club, url, chrono::Local::now(), detail))
            .await
    }

    pub async fn favorites_available<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.send(&messages::favorites_available(names)).await
    }

    /// Report a crashed cycle, if error reports are enabled.
    pub async fn cycle_error(&self, error: &str) -> bool {
        if !self.notify_errors {
            return false;
        }
        self.send(&messages::error_report(error)).await
    }
}
