use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::matcher::FavoriteList;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub pages: PagesConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A credential that is wiped from memory on drop and never printed.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(***)")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Login form URL
    pub login_url: String,
    /// A page that only renders for an authenticated session
    pub auth_probe_url: String,
    pub username: String,
    pub password: Secret,
    /// URL fragments that indicate the authenticated area
    pub authenticated_markers: Vec<String>,
    /// URL fragment that indicates a redirect to the login page
    pub login_marker: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://ion.tjhsst.edu/login".to_string(),
            auth_probe_url: "https://ion.tjhsst.edu/eighth/".to_string(),
            username: String::new(),
            password: Secret::default(),
            authenticated_markers: vec!["eighth".to_string(), "dashboard".to_string()],
            login_marker: "login".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Prefix that page ids are appended to
    pub base_url: String,
    /// First page id (inclusive)
    pub start: u32,
    /// Last page id (inclusive)
    pub end: u32,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ion.tjhsst.edu/eighth/signup/".to_string(),
            start: 4555,
            end: 4583,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Favorite club names, highest priority first
    pub favorites: Vec<String>,
    /// Reserve the best match automatically instead of only notifying
    pub auto_signup: bool,
    /// Delay between page fetches in seconds
    pub rate_limit_delay_secs: u64,
    /// Maximum activity entries examined per page
    pub max_entries_per_page: usize,
    /// Words used by the last-resort text scan, in addition to the favorites
    pub fallback_keywords: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            favorites: Vec::new(),
            auto_signup: true,
            rate_limit_delay_secs: 15,
            max_entries_per_page: 20,
            fallback_keywords: vec!["club".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Pause between monitoring cycles (default: 600s)
    pub cycle_interval_secs: u64,
    /// Pause after a crashed cycle (default: 120s)
    pub error_cooldown_secs: u64,
    /// Stop after this many cycles (None = run until stopped)
    pub max_cycles: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 600,
            error_cooldown_secs: 120,
            max_cycles: None,
        }
    }
}

/// How a second-factor challenge during login is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecondFactorMode {
    /// Wait for an operator to finish the challenge in the browser
    Interactive,
    /// Treat the challenge as a fatal authentication failure
    #[default]
    Unattended,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome executable (None = auto-detect)
    pub chrome_path: Option<String>,
    pub navigation_timeout_secs: u64,
    /// Settle timeout after clicking a signup control
    pub action_timeout_secs: u64,
    /// Settle timeout after clicking a confirmation control
    pub confirm_timeout_secs: u64,
    /// How long an operator has to finish a second-factor challenge
    pub second_factor_timeout_secs: u64,
    pub second_factor: SecondFactorMode,
    /// Where the authenticated session is persisted
    pub session_file: PathBuf,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            navigation_timeout_secs: 30,
            action_timeout_secs: 15,
            confirm_timeout_secs: 10,
            second_factor_timeout_secs: 60,
            second_factor: SecondFactorMode::Unattended,
            session_file: PathBuf::from("ion_session.json"),
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn second_factor_timeout(&self) -> Duration {
        Duration::from_secs(self.second_factor_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook that relays plain-text messages (e.g. an email-to-SMS bridge)
    pub webhook_url: Option<String>,
    /// Destination address handed to the relay
    pub destination: Option<String>,
    pub subject: String,
    /// Also report crashed cycles
    pub notify_errors: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            destination: None,
            subject: "8th Period Alert".to_string(),
            notify_errors: false,
        }
    }
}

impl NotifyConfig {
    pub fn is_configured(&self) -> bool {
        self.webhook_url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.destination.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/default.toml` and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config", None)
    }

    /// Load configuration from a directory plus an optional explicit file
    pub fn load_from<P: AsRef<Path>>(
        config_dir: P,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        // CLUBWATCH_SITE__USERNAME, CLUBWATCH_MONITOR__FAVORITES="A,B", ...
        let builder = builder.add_source(
            Environment::with_prefix("CLUBWATCH")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("monitor.favorites")
                .with_list_parse_key("monitor.fallback_keywords")
                .with_list_parse_key("site.authenticated_markers")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Pages to monitor, in fixed order
    pub fn page_urls(&self) -> Vec<String> {
        (self.pages.start..=self.pages.end)
            .map(|id| format!("{}{}", self.pages.base_url, id))
            .collect()
    }

    /// Validate configuration values, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.site.username.trim().is_empty() {
            errors.push("site.username is required".to_string());
        }
        if self.site.password.is_empty() {
            errors.push("site.password is required".to_string());
        }

        if let Err(e) = FavoriteList::parse(&self.monitor.favorites) {
            errors.push(e);
        }

        if !self.pages.base_url.starts_with("http://") && !self.pages.base_url.starts_with("https://")
        {
            errors.push(format!(
                "pages.base_url should start with http/https: {}",
                self.pages.base_url
            ));
        }

        if self.pages.start > self.pages.end {
            errors.push(format!(
                "pages.start ({}) should not exceed pages.end ({})",
                self.pages.start, self.pages.end
            ));
        }

        if self.monitor.max_entries_per_page == 0 {
            errors.push("monitor.max_entries_per_page must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// [`validate`](Self::validate) as a crate error.
    pub fn ensure_valid(&self) -> crate::error::Result<()> {
        self.validate().map_err(crate::error::WatchError::InvalidConfig)
    }

    /// Non-fatal configuration concerns
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let span = self.pages.end.saturating_sub(self.pages.start) + 1;
        if span > 50 {
            warnings.push(format!("Large page range ({span} pages). Cycles will be slow."));
        }

        if !self.notify.is_configured() {
            warnings.push("Notifications not configured (notify.webhook_url / notify.destination)".to_string());
        }

        if self.monitor.rate_limit_delay_secs == 0 {
            warnings.push("monitor.rate_limit_delay_secs is 0; pages will be fetched back-to-back".to_string());
        }

        warnings
    }

    /// The favorites list in priority order. Call after `validate`.
    pub fn favorites(&self) -> FavoriteList {
        FavoriteList::parse(&self.monitor.favorites).unwrap_or_default()
    }
}
