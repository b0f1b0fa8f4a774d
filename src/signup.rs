//! Reserving a matched activity and reading back what happened.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::browser::{first_visible_on_page, BrowserPage, Locator};
use crate::config::AppConfig;
use crate::matcher::Match;
use crate::notify::Alerts;

const SUCCESS_SELECTORS: &[&str] = &[
    ".alert-success",
    ".success-message",
    ".notification.success",
    ".message.success",
];

const ERROR_SELECTORS: &[&str] = &[
    ".alert-error",
    ".error-message",
    ".notification.error",
    ".message.error",
];

const SUCCESS_URL_MARKERS: &[&str] = &["success", "signed-up"];
const SUCCESS_PHRASES: &[&str] = &["successfully signed up", "registration confirmed", "added to activity"];
const FAILURE_PHRASES: &[&str] = &["already signed up", "activity is full", "registration failed"];

/// Result of one signup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    Success { message: String },
    Failure { message: String },
    /// Neither success nor failure could be read off the page. Treated as
    /// "not signed up".
    Ambiguous { raw_snippet: String },
}

impl SignupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SignupOutcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            SignupOutcome::Success { message } | SignupOutcome::Failure { message } => message,
            SignupOutcome::Ambiguous { raw_snippet } => raw_snippet,
        }
    }
}

impl std::fmt::Display for SignupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignupOutcome::Success { message } => write!(f, "success: {message}"),
            SignupOutcome::Failure { message } => write!(f, "failure: {message}"),
            SignupOutcome::Ambiguous { raw_snippet } => write!(f, "ambiguous: {raw_snippet}"),
        }
    }
}

/// Clubs reserved during this process's lifetime. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct PreviousSignups {
    names: HashSet<String>,
}

impl PreviousSignups {
    pub fn contains(&self, club: &str) -> bool {
        self.names.contains(club)
    }

    pub fn insert(&mut self, club: impl Into<String>) -> bool {
        self.names.insert(club.into())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

fn locators(selectors: &[&str]) -> Vec<Locator> {
    selectors.iter().map(|s| Locator::css(*s)).collect()
}

/// Confirmation controls, tried in order.
pub fn confirm_locators() -> Vec<Locator> {
    vec![
        Locator::has_text("button", "Confirm"),
        Locator::has_text("button", "Yes"),
        Locator::has_text("button", "OK"),
        Locator::css(".modal-confirm button"),
        Locator::css(".confirm-button"),
    ]
}

/// Read the outcome of a signup off the loaded page. First hit wins:
/// success banner, error banner, success URL, success phrase, failure
/// phrase.
pub async fn classify_result(page: &dyn BrowserPage) -> crate::error::Result<SignupOutcome> {
    if let Some(banner) = first_visible_on_page(page, &locators(SUCCESS_SELECTORS)).await? {
        return Ok(SignupOutcome::Success {
            message: banner.text().await?.trim().to_string(),
        });
    }

    if let Some(banner) = first_visible_on_page(page, &locators(ERROR_SELECTORS)).await? {
        return Ok(SignupOutcome::Failure {
            message: banner.text().await?.trim().to_string(),
        });
    }

    let url = page.current_url().await?.to_lowercase();
    if SUCCESS_URL_MARKERS.iter().any(|m| url.contains(m)) {
        return Ok(SignupOutcome::Success {
            message: "URL changed".to_string(),
        });
    }

    let content = page.content().await?.to_lowercase();
    if let Some(phrase) = SUCCESS_PHRASES.iter().find(|p| content.contains(*p)) {
        return Ok(SignupOutcome::Success {
            message: phrase.to_string(),
        });
    }
    if let Some(phrase) = FAILURE_PHRASES.iter().find(|p| content.contains(*p)) {
        return Ok(SignupOutcome::Failure {
            message: phrase.to_string(),
        });
    }

    Ok(SignupOutcome::Ambiguous {
        raw_snippet: "Result unclear".to_string(),
    })
}

/// Performs signups and remembers which clubs already succeeded.
pub struct SignupExecutor {
    alerts: Alerts,
    previous: PreviousSignups,
    action_timeout: Duration,
    confirm_timeout: Duration,
}

impl SignupExecutor {
    pub fn new(alerts: Alerts, action_timeout: Duration, confirm_timeout: Duration) -> Self {
        Self {
            alerts,
            previous: PreviousSignups::default(),
            action_timeout,
            confirm_timeout,
        }
    }

    pub fn from_config(config: &AppConfig, alerts: Alerts) -> Self {
        Self::new(
            alerts,
            config.browser.action_timeout(),
            config.browser.confirm_timeout(),
        )
    }

    pub fn previous_signups(&self) -> &PreviousSignups {
        &self.previous
    }

    pub fn already_signed_up(&self, club: &str) -> bool {
        self.previous.contains(club)
    }

    /// Click the match's signup control, confirm if asked, and classify.
    ///
    /// Errors along the way become a `Failure`. Only a `Success` records the
    /// club and notifies the operator.
    pub async fn attempt_signup(&mut self, page: &dyn BrowserPage, m: &Match) -> SignupOutcome {
        info!(club = %m.name, priority = m.priority, "Attempting signup");

        let outcome = match self.perform(page, m).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(club = %m.name, "Signup error: {}", e);
                SignupOutcome::Failure {
                    message: format!("Signup error: {e}"),
                }
            }
        };

        match &outcome {
            SignupOutcome::Success { message } => {
                info!(club = %m.name, "Signed up: {}", message);
                self.previous.insert(m.name.clone());

                let url = page.current_url().await.unwrap_or_default();
                if !self.alerts.signup_success(&m.name, &url, message).await {
                    warn!(club = %m.name, "Signup succeeded but the notification was not delivered");
                }
            }
            SignupOutcome::Failure { message } => warn!(club = %m.name, "Signup failed: {}", message),
            SignupOutcome::Ambiguous { raw_snippet } => {
                warn!(club = %m.name, "Signup result unclear: {}", raw_snippet)
            }
        }
        outcome
    }

    async fn perform(&self, page: &dyn BrowserPage, m: &Match) -> crate::error::Result<SignupOutcome> {
        let action = &m.entry.action;
        action.scroll_into_view().await?;
        action.click().await?;
        page.wait_until_settled(self.action_timeout).await?;

        if let Some(confirm) = first_visible_on_page(page, &confirm_locators()).await? {
            debug!(club = %m.name, "Confirming signup");
            confirm.click().await?;
            page.wait_until_settled(self.confirm_timeout).await?;
        }

        classify_result(page).await
    }
}
