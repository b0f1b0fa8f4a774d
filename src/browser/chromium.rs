//! Headless Chrome substrate built on chromiumoxide.
//!
//! `ChromiumBrowser` owns the Chrome process and the CDP handler task;
//! `ChromiumPage` adapts one tab to [`BrowserPage`].

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::wait::{wait_for_result, WaitConfig};
use super::{
    BrowserPage, ElementHandle, Locator, OpenPage, PageElement, PageLauncher, SessionCookie,
    SessionState,
};
use crate::error::{Result, WatchError};

/// Pause after a click before polling readiness, so a navigation the click
/// triggered has started by the time we look.
const NAVIGATION_START_GRACE: Duration = Duration::from_millis(300);

const VISIBILITY_JS: &str = "function() { \
    const rect = this.getBoundingClientRect(); \
    const style = window.getComputedStyle(this); \
    return rect.width > 0 && rect.height > 0 \
        && style.visibility !== 'hidden' && style.display !== 'none'; \
}";

/// Launch options for the monitoring browser.
#[derive(Debug, Clone)]
pub struct ChromiumLaunchConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub args: Vec<String>,
    /// Chrome executable path (None = auto-detect)
    pub chrome_path: Option<String>,
}

impl Default for ChromiumLaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1366, 900),
            args: vec![
                // Required when user namespaces are unavailable (containers, CI)
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

impl ChromiumLaunchConfig {
    pub fn from_settings(settings: &crate::config::BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            chrome_path: settings.chrome_path.clone(),
            ..Self::default()
        }
    }

    fn to_browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();

        // chromiumoxide launches headless unless told otherwise
        if !self.headless {
            builder = builder.with_head();
        }

        builder = builder.window_size(self.window_size.0, self.window_size.1);

        builder = builder.user_data_dir(profile_dir);

        for arg in &self.args {
            builder = builder.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path.clone());
        }

        builder
            .build()
            .map_err(|e| WatchError::Browser(format!("invalid browser configuration: {e}")))
    }
}

/// A running Chrome instance.
pub struct ChromiumBrowser {
    inner: Arc<Mutex<Option<Browser>>>,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
}

/// A fresh profile per launch; cookies come from the session file only.
fn fresh_profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!("clubwatch-profile-{}", uuid::Uuid::new_v4()))
}

/// Delete a launch profile. A profile that was never created is fine.
async fn remove_profile(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(path = %dir.display(), "Removed browser profile"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), "Could not remove browser profile: {}", e),
    }
}

impl ChromiumBrowser {
    /// Launch Chrome and start driving its CDP event stream.
    pub async fn launch(config: ChromiumLaunchConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);

        let profile_dir = fresh_profile_dir();
        let browser_config = config.to_browser_config(&profile_dir)?;
        let (browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile(&profile_dir).await;
                return Err(WatchError::Browser(format!("failed to launch Chrome: {e}")));
            }
        };

        // chromiumoxide only makes progress while its handler is polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
            handler_task,
            profile_dir,
        })
    }

    pub async fn new_page(&self) -> Result<ChromiumPage> {
        let guard = self.inner.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| WatchError::Browser("browser already closed".to_string()))?;

        let page = browser.new_page("about:blank").await?;
        Ok(ChromiumPage { page })
    }

    /// Close Chrome and delete its profile. Dropping without closing kills
    /// the process and leaves the profile behind.
    pub async fn close(self) -> Result<()> {
        let closed = match self.inner.lock().await.take() {
            Some(mut browser) => {
                debug!("Closing browser");
                let closed = browser.close().await.map(|_| ());
                let _ = browser.wait().await;
                closed
            }
            None => Ok(()),
        };
        self.handler_task.abort();
        remove_profile(&self.profile_dir).await;
        closed.map_err(WatchError::from)
    }
}

/// Launches a fresh Chrome per cycle, so a wedged browser never outlives
/// the cycle that wedged it.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: ChromiumLaunchConfig,
}

impl ChromiumLauncher {
    pub fn new(config: ChromiumLaunchConfig) -> Self {
        Self { config }
    }
}

struct ChromiumSession {
    browser: ChromiumBrowser,
    page: ChromiumPage,
}

#[async_trait]
impl PageLauncher for ChromiumLauncher {
    async fn open(&self) -> Result<Box<dyn OpenPage>> {
        let browser = ChromiumBrowser::launch(self.config.clone()).await?;
        let page = browser.new_page().await?;
        Ok(Box::new(ChromiumSession { browser, page }))
    }
}

#[async_trait]
impl OpenPage for ChromiumSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser.close().await
    }
}

/// One Chrome tab.
#[derive(Debug, Clone)]
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn ready_state_complete(page: Page) -> Result<bool> {
        let result = page.evaluate("document.readyState").await?;
        Ok(result
            .value()
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == "complete"))
    }
}

async fn retain_matching(elements: Vec<Element>, locator: &Locator) -> Result<Vec<Element>> {
    if matches!(locator, Locator::Css(_)) {
        return Ok(elements);
    }

    let mut kept = Vec::with_capacity(elements.len());
    for element in elements {
        let text = element.inner_text().await?.unwrap_or_default();
        if locator.accepts_text(&text) {
            kept.push(element);
        }
    }
    Ok(kept)
}

fn into_handles(elements: Vec<Element>) -> Vec<ElementHandle> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumElement { element }) as ElementHandle)
        .collect()
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(WatchError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(WatchError::timeout(format!("navigation to {url}"), timeout)),
        }
        self.wait_until_settled(timeout).await
    }

    async fn wait_until_settled(&self, timeout: Duration) -> Result<()> {
        tokio::time::sleep(NAVIGATION_START_GRACE).await;
        let _ = tokio::time::timeout(timeout, self.page.wait_for_navigation()).await;

        wait_for_result(
            || Self::ready_state_complete(self.page.clone()),
            WaitConfig::with_timeout(timeout),
            "document ready",
        )
        .await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let elements = self.page.find_elements(locator.css_selector()).await?;
        Ok(into_handles(retain_matching(elements, locator).await?))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let elements = self.page.find_elements(locator.css_selector()).await?;
        let element = retain_matching(elements, locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WatchError::Browser(format!("no element for {locator}")))?;
        element.click().await?;

        // JSON encoding keeps the value a string literal inside the script
        let escaped = serde_json::to_string(value)?;
        let script = format!(
            "function() {{ this.value = {escaped}; \
             this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}"
        );
        element.call_js_fn(script, false).await?;
        Ok(())
    }

    async fn export_session(&self) -> Result<SessionState> {
        let cookies = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect();
        Ok(SessionState { cookies })
    }

    async fn import_session(&self, state: &SessionState) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }

        let params = state
            .cookies
            .iter()
            .map(|c| {
                CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .secure(c.secure)
                    .http_only(c.http_only)
                    .build()
                    .map_err(WatchError::Browser)
            })
            .collect::<Result<Vec<_>>>()?;

        self.page.set_cookies(params).await?;
        debug!(count = state.cookies.len(), "Restored session cookies");
        Ok(())
    }
}

struct ChromiumElement {
    element: Element,
}

#[async_trait]
impl PageElement for ChromiumElement {
    async fn text(&self) -> Result<String> {
        Ok(self.element.inner_text().await?.unwrap_or_default())
    }

    async fn markup(&self) -> Result<String> {
        Ok(self.element.inner_html().await?.unwrap_or_default())
    }

    async fn is_visible(&self) -> Result<bool> {
        let returns = self.element.call_js_fn(VISIBILITY_JS, false).await?;
        Ok(returns
            .result
            .value
            .as_ref()
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let elements = self.element.find_elements(locator.css_selector()).await?;
        Ok(into_handles(retain_matching(elements, locator).await?))
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.element.scroll_into_view().await?;
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        self.element.click().await?;
        Ok(())
    }
}
