//! One monitoring cycle: authenticate, sweep every page, act on the best
//! match, report.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::browser::BrowserPage;
use crate::config::AppConfig;
use crate::error::{Result, WatchError};
use crate::matcher::{ClubMatcher, Match};
use crate::notify::{messages, Alerts};
use crate::signup::SignupExecutor;

/// A match as remembered after its page has been left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub name: String,
    pub favorite: String,
    pub priority: usize,
    pub page_url: String,
}

impl MatchSummary {
    fn from_match(m: &Match, page_url: &str) -> Self {
        Self {
            name: m.name.clone(),
            favorite: m.favorite.clone(),
            priority: m.priority,
            page_url: page_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Matches from every page visited, in visit order
    pub all_matches: Vec<MatchSummary>,
    pub signed_up: bool,
    /// False when the cycle stopped at authentication
    pub authenticated: bool,
    pub pages_checked: usize,
}

impl CycleReport {
    pub fn found_matches(&self) -> bool {
        !self.all_matches.is_empty()
    }
}

pub struct MonitorCycle {
    authenticator: Authenticator,
    matcher: ClubMatcher,
    executor: SignupExecutor,
    alerts: Alerts,
    pages: Vec<String>,
    auto_signup: bool,
    rate_limit_delay: Duration,
    navigation_timeout: Duration,
}

impl MonitorCycle {
    pub fn new(
        authenticator: Authenticator,
        matcher: ClubMatcher,
        executor: SignupExecutor,
        alerts: Alerts,
        pages: Vec<String>,
    ) -> Self {
        Self {
            authenticator,
            matcher,
            executor,
            alerts,
            pages,
            auto_signup: true,
            rate_limit_delay: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &AppConfig, authenticator: Authenticator, alerts: Alerts) -> Self {
        Self::new(
            authenticator,
            ClubMatcher::from_config(config),
            SignupExecutor::from_config(config, alerts.clone()),
            alerts,
            config.page_urls(),
        )
        .with_auto_signup(config.monitor.auto_signup)
        .with_rate_limit(Duration::from_secs(config.monitor.rate_limit_delay_secs))
        .with_navigation_timeout(config.browser.navigation_timeout())
    }

    pub fn with_auto_signup(mut self, enabled: bool) -> Self {
        self.auto_signup = enabled;
        self
    }

    pub fn with_rate_limit(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn executor(&self) -> &SignupExecutor {
        &self.executor
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Run one sweep over all pages.
    ///
    /// Returns early after the first successful signup. Page-level failures
    /// are logged and skipped; only an unattended second-factor challenge,
    /// at cycle start or during a mid-cycle re-login, escapes as an error.
    pub async fn run(&mut self, page: &dyn BrowserPage) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        if let Err(e) = self.authenticator.login(page).await {
            if matches!(e, WatchError::SecondFactorRequired) {
                return Err(e);
            }
            error!("Authentication failed, skipping cycle: {}", e);
            return Ok(report);
        }
        report.authenticated = true;

        let pages = self.pages.clone();
        let last = pages.len().saturating_sub(1);
        for (i, url) in pages.iter().enumerate() {
            let matches = self.check_page(page, url).await?;
            report.pages_checked += 1;

            report
                .all_matches
                .extend(matches.iter().map(|m| MatchSummary::from_match(m, url)));

            if self.auto_signup {
                if let Some(best) = matches.first() {
                    if self.executor.already_signed_up(&best.name) {
                        info!(club = %best.name, "Already signed up, skipping");
                    } else if self.executor.attempt_signup(page, best).await.is_success() {
                        info!(club = %best.name, "Auto-signup successful, stopping monitoring cycle");
                        report.signed_up = true;
                        return Ok(report);
                    }
                }
            }

            if i < last && !self.rate_limit_delay.is_zero() {
                debug!(delay = ?self.rate_limit_delay, "Rate limiting before next page");
                tokio::time::sleep(self.rate_limit_delay).await;
            }
        }

        if report.found_matches() && !self.auto_signup {
            let names: Vec<&str> = report
                .all_matches
                .iter()
                .take(messages::SUMMARY_LIMIT)
                .map(|m| m.name.as_str())
                .collect();
            if !self.alerts.favorites_available(&names).await {
                warn!("Availability summary was not delivered");
            }
        }

        Ok(report)
    }

    /// Load one page and scan it. Any failure yields no matches, except a
    /// second-factor challenge that ends the cycle.
    async fn check_page(&self, page: &dyn BrowserPage, url: &str) -> Result<Vec<Match>> {
        info!(url, "Checking page");

        if let Err(e) = self.load(page, url).await {
            match e {
                WatchError::SecondFactorRequired => return Err(e),
                WatchError::Timeout { .. } => warn!(url, "Timeout loading page"),
                e if e.is_recoverable() => warn!(url, "Page skipped: {}", e),
                other => error!(url, "Error monitoring page: {}", other),
            }
            return Ok(Vec::new());
        }

        let matches = self.matcher.find_matches(page).await;
        if !matches.is_empty() {
            info!(url, count = matches.len(), "Found matching activities");
            for m in &matches {
                info!(club = %m.name, priority = m.priority, "  match");
            }
        }
        Ok(matches)
    }

    /// Navigate to `url`, re-authenticating once if the session expired.
    async fn load(&self, page: &dyn BrowserPage, url: &str) -> Result<()> {
        page.goto(url, self.navigation_timeout).await?;

        let landed = page.current_url().await?;
        if self.authenticator.is_login_url(&landed) {
            if let Err(e) = self.authenticator.handle_session_expiry(page).await {
                if !matches!(e, WatchError::SecondFactorRequired) {
                    error!("Session recovery failed: {}", e);
                }
                return Err(e);
            }
            page.goto(url, self.navigation_timeout).await?;
        }
        Ok(())
    }
}
