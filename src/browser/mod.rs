//! Browser automation seam.
//!
//! The monitor only talks to a page through [`BrowserPage`] and the element
//! handles it hands out ([`PageElement`]). Two substrates implement it:
//! - [`chromium`]: a live headless Chrome driven over CDP
//! - [`snapshot`]: static HTML routes parsed in memory (offline scans, tests)

pub mod chromium;
pub mod snapshot;
pub mod wait;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

pub use chromium::{ChromiumBrowser, ChromiumLaunchConfig, ChromiumLauncher, ChromiumPage};
pub use snapshot::{LoginGate, SnapshotPage};
pub use wait::{wait_for_result, WaitConfig};

/// How to find elements on a page or inside another element.
#[derive(Debug, Clone)]
pub enum Locator {
    /// Plain CSS selector
    Css(String),
    /// CSS selector filtered by a case-insensitive substring of the element's text
    HasText { css: String, needle: String },
    /// CSS selector filtered by a pattern over the element's text
    Matches { css: String, pattern: Regex },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// `css` elements whose text contains `text`, case-insensitively
    pub fn has_text(css: impl Into<String>, text: &str) -> Self {
        Locator::HasText {
            css: css.into(),
            needle: text.to_lowercase(),
        }
    }

    /// `css` elements whose text matches `pattern`
    pub fn matching(css: impl Into<String>, pattern: Regex) -> Self {
        Locator::Matches {
            css: css.into(),
            pattern,
        }
    }

    pub fn css_selector(&self) -> &str {
        match self {
            Locator::Css(css) | Locator::HasText { css, .. } | Locator::Matches { css, .. } => css,
        }
    }

    /// Whether an element with this text passes the locator's text filter
    pub fn accepts_text(&self, text: &str) -> bool {
        match self {
            Locator::Css(_) => true,
            Locator::HasText { needle, .. } => text.to_lowercase().contains(needle.as_str()),
            Locator::Matches { pattern, .. } => pattern.is_match(text),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{css}"),
            Locator::HasText { css, needle } => write!(f, "{css}:has-text(\"{needle}\")"),
            Locator::Matches { css, pattern } => write!(f, "{css}:has-text(/{pattern}/)"),
        }
    }
}

/// Serialized authentication state (cookies) of a browser context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<SessionCookie>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// A live element on the currently loaded page.
///
/// Handles are only valid while the page that produced them stays loaded;
/// after a navigation they report [`crate::error::WatchError::ElementDetached`].
#[async_trait]
pub trait PageElement: Send + Sync {
    /// Rendered text
    async fn text(&self) -> Result<String>;

    /// Inner markup
    async fn markup(&self) -> Result<String>;

    async fn is_visible(&self) -> Result<bool>;

    /// Descendants matching `locator`
    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    async fn scroll_into_view(&self) -> Result<()>;

    async fn click(&self) -> Result<()>;
}

pub type ElementHandle = Box<dyn PageElement>;

/// One browser tab with an authenticated (or not yet) context.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the page to settle
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait for in-flight navigation and page activity to settle
    async fn wait_until_settled(&self, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Full page markup
    async fn content(&self) -> Result<String>;

    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    /// Type `value` into the first element matching `locator`
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

    async fn export_session(&self) -> Result<SessionState>;

    async fn import_session(&self, state: &SessionState) -> Result<()>;
}

/// A page opened for one monitoring cycle.
#[async_trait]
pub trait OpenPage: Send + Sync {
    fn page(&self) -> &dyn BrowserPage;

    /// Release the page and whatever browser backs it
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens a fresh page (and browser context) per cycle.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn OpenPage>>;
}

/// First visible element matching any of `locators`, tried in order.
pub async fn first_visible_on_page(
    page: &dyn BrowserPage,
    locators: &[Locator],
) -> Result<Option<ElementHandle>> {
    for locator in locators {
        for element in page.find(locator).await? {
            if element.is_visible().await.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}

/// First visible descendant of `parent` matching any of `locators`.
///
/// Only the first match of each locator is considered, so a hidden first
/// match falls through to the next locator.
pub async fn first_visible_within(
    parent: &dyn PageElement,
    locators: &[Locator],
) -> Result<Option<ElementHandle>> {
    for locator in locators {
        if let Some(element) = parent.find(locator).await?.into_iter().next() {
            if element.is_visible().await.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}
