use std::time::Duration;
use thiserror::Error;

/// Main error type for the signup monitor
#[derive(Error, Debug)]
pub enum WatchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Second-factor challenge requires an operator")]
    SecondFactorRequired,

    // Browser / page errors
    #[error("Timeout during {step} after {after:?}")]
    Timeout { step: String, after: Duration },

    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element is no longer attached to the page")]
    ElementDetached,

    // Notification errors
    #[error("Notification error: {0}")]
    Notification(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // IO / serialization errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// Errors that only cost the current page or step. The caller logs them
    /// and moves on instead of aborting the cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatchError::Timeout { .. }
                | WatchError::Navigation { .. }
                | WatchError::Browser(_)
                | WatchError::ElementDetached
                | WatchError::Notification(_)
                | WatchError::Http(_)
        )
    }

    pub fn timeout(step: impl Into<String>, after: Duration) -> Self {
        WatchError::Timeout {
            step: step.into(),
            after,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for WatchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        WatchError::Browser(err.to_string())
    }
}

/// Result type alias for WatchError
pub type Result<T> = std::result::Result<T, WatchError>;
