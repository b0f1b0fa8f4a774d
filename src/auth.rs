//! Logging in and keeping the session alive.
//!
//! A stored session is tried first: it is imported into the page and
//! probed against a URL that only renders when logged in. Only when the
//! probe bounces to the login page are credentials sent again. Second-factor
//! challenges are handed to a [`SecondFactorPolicy`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::browser::{first_visible_on_page, BrowserPage, Locator};
use crate::config::{AppConfig, SecondFactorMode, SiteConfig};
use crate::error::{Result, WatchError};
use crate::session::SessionStore;

const USERNAME_FIELD: &str = r#"input[name="username"]"#;
const PASSWORD_FIELD: &str = r#"input[name="password"]"#;
const SUBMIT_CONTROL: &str = r#"input[type="submit"], button[type="submit"]"#;
const SECOND_FACTOR_FIELD: &str = r#"input[name*="otp"], input[name*="token"]"#;
const SECOND_FACTOR_URL_MARKER: &str = "two-factor";

/// Something that resolves once an operator says they are done.
#[async_trait]
pub trait OperatorSignal: Send + Sync {
    async fn wait(&self) -> Result<()>;
}

/// Asks on the terminal and waits for Enter.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl OperatorSignal for StdinPrompt {
    async fn wait(&self) -> Result<()> {
        println!("2FA code required. Complete the challenge in the browser window.");
        println!("Press ENTER when you have completed 2FA...");

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| WatchError::Other(anyhow::anyhow!("stdin prompt task failed: {e}")))?;

        line.map(|_| ()).map_err(WatchError::Io)
    }
}

/// Resolves when another task calls `notify_one` on the shared handle.
#[async_trait]
impl OperatorSignal for Arc<Notify> {
    async fn wait(&self) -> Result<()> {
        self.notified().await;
        Ok(())
    }
}

/// What to do when login lands on a second-factor challenge.
#[async_trait]
pub trait SecondFactorPolicy: Send + Sync {
    /// Return once the challenge is done, or an error if it cannot be.
    async fn resolve(&self, page: &dyn BrowserPage) -> Result<()>;
}

/// No operator present: the challenge is a hard failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

#[async_trait]
impl SecondFactorPolicy for Unattended {
    async fn resolve(&self, _page: &dyn BrowserPage) -> Result<()> {
        error!("Second-factor challenge in unattended mode; run `clubwatch login` to refresh the session");
        Err(WatchError::SecondFactorRequired)
    }
}

/// Suspend until an operator finishes the challenge in the browser.
pub struct Interactive {
    signal: Box<dyn OperatorSignal>,
    settle_timeout: Duration,
}

impl Interactive {
    pub fn new(signal: impl OperatorSignal + 'static, settle_timeout: Duration) -> Self {
        Self {
            signal: Box::new(signal),
            settle_timeout,
        }
    }

    pub fn stdin(settle_timeout: Duration) -> Self {
        Self::new(StdinPrompt, settle_timeout)
    }
}

#[async_trait]
impl SecondFactorPolicy for Interactive {
    async fn resolve(&self, page: &dyn BrowserPage) -> Result<()> {
        warn!("2FA required - waiting for operator");
        self.signal.wait().await?;
        page.wait_until_settled(self.settle_timeout).await
    }
}

/// The policy configured for unattended runs of this process.
pub fn policy_from_config(config: &AppConfig) -> Box<dyn SecondFactorPolicy> {
    match config.browser.second_factor {
        SecondFactorMode::Interactive => {
            Box::new(Interactive::stdin(config.browser.second_factor_timeout()))
        }
        SecondFactorMode::Unattended => Box::new(Unattended),
    }
}

pub struct Authenticator {
    site: SiteConfig,
    store: SessionStore,
    second_factor: Box<dyn SecondFactorPolicy>,
    navigation_timeout: Duration,
}

impl Authenticator {
    pub fn new(
        site: SiteConfig,
        store: SessionStore,
        second_factor: Box<dyn SecondFactorPolicy>,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            site,
            store,
            second_factor,
            navigation_timeout,
        }
    }

    pub fn from_config(config: &AppConfig, second_factor: Box<dyn SecondFactorPolicy>) -> Self {
        Self::new(
            config.site.clone(),
            SessionStore::new(config.browser.session_file.clone()),
            second_factor,
            config.browser.navigation_timeout(),
        )
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Whether `url` is (a redirect to) the login page.
    pub fn is_login_url(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.site.login_marker.to_lowercase())
    }

    fn is_authenticated_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        !url.contains(&self.site.login_marker.to_lowercase())
            && self
                .site
                .authenticated_markers
                .iter()
                .any(|m| url.contains(&m.to_lowercase()))
    }

    /// Whether the page currently shows the authenticated area.
    pub async fn is_authenticated(&self, page: &dyn BrowserPage) -> bool {
        match page.current_url().await {
            Ok(url) => self.is_authenticated_url(&url),
            Err(e) => {
                debug!("Could not read page URL: {}", e);
                false
            }
        }
    }

    /// Establish a session; failures are logged and reported as `false`.
    pub async fn authenticate(&self, page: &dyn BrowserPage) -> bool {
        match self.login(page).await {
            Ok(()) => true,
            Err(e) => {
                error!("Authentication failed: {}", e);
                false
            }
        }
    }

    /// Recover from a mid-cycle redirect to the login page.
    ///
    /// Errors are returned as-is so callers can tell a failed login apart
    /// from a second-factor challenge nobody can answer.
    pub async fn handle_session_expiry(&self, page: &dyn BrowserPage) -> Result<()> {
        warn!("Session expired, re-authenticating...");
        self.login(page).await
    }

    /// Establish a session, reporting why it failed.
    pub async fn login(&self, page: &dyn BrowserPage) -> Result<()> {
        if self.resume_stored_session(page).await? {
            return Ok(());
        }

        info!(url = %self.site.login_url, "Logging in");
        page.goto(&self.site.login_url, self.navigation_timeout).await?;

        page.fill(&Locator::css(USERNAME_FIELD), &self.site.username).await?;
        page.fill(&Locator::css(PASSWORD_FIELD), self.site.password.expose())
            .await?;

        let submit = first_visible_on_page(page, &[Locator::css(SUBMIT_CONTROL)])
            .await?
            .ok_or_else(|| WatchError::Auth("login form has no submit control".to_string()))?;
        submit.click().await?;
        page.wait_until_settled(self.navigation_timeout).await?;

        if self.second_factor_pending(page).await? {
            self.second_factor.resolve(page).await?;
        }

        let url = page.current_url().await?;
        if !self.is_authenticated_url(&url) {
            return Err(WatchError::Auth(format!(
                "login did not reach the authenticated area (at {url})"
            )));
        }

        info!("Authentication successful");
        self.persist_session(page).await;
        Ok(())
    }

    async fn resume_stored_session(&self, page: &dyn BrowserPage) -> Result<bool> {
        let Some(stored) = self.store.load().await? else {
            return Ok(false);
        };

        info!("Loading existing session...");
        let probed = async {
            page.import_session(&stored).await?;
            page.goto(&self.site.auth_probe_url, self.navigation_timeout)
                .await?;
            page.current_url().await
        };
        let url = match probed.await {
            Ok(url) => url,
            Err(e) => {
                warn!("Stored session could not be checked, logging in again: {}", e);
                return Ok(false);
            }
        };

        if self.is_login_url(&url) {
            info!("Stored session expired");
            Ok(false)
        } else {
            info!("Existing session valid");
            Ok(true)
        }
    }

    async fn second_factor_pending(&self, page: &dyn BrowserPage) -> Result<bool> {
        let url = page.current_url().await?;
        if url.to_lowercase().contains(SECOND_FACTOR_URL_MARKER) {
            return Ok(true);
        }
        Ok(first_visible_on_page(page, &[Locator::css(SECOND_FACTOR_FIELD)])
            .await?
            .is_some())
    }

    async fn persist_session(&self, page: &dyn BrowserPage) {
        let saved = match page.export_session().await {
            Ok(state) => self.store.save(&state).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(path = %self.store.path().display(), "Could not save session: {}", e);
        }
    }
}
