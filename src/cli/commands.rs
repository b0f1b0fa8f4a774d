//! Command handlers behind the `clubwatch` binary.

use anyhow::{bail, Context};
use std::path::Path;
use tracing::info;

use super::output::{print_error, print_items, print_kv, print_success, print_warn, MatchRow, OutputMode};
use crate::auth::{policy_from_config, Authenticator, Interactive};
use crate::browser::{ChromiumLaunchConfig, ChromiumLauncher, PageLauncher, SnapshotPage};
use crate::config::{AppConfig, Secret};
use crate::matcher::{ClubMatcher, FavoriteList};
use crate::monitor::{MatchSummary, MonitorCycle};
use crate::notify::Alerts;
use crate::runner::{ContinuousRunner, RunnerSettings, StopSignal};

/// Load configuration and refuse to continue if it is invalid.
pub fn load_valid_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load_from("config", explicit).context("Failed to load configuration")?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            print_error(&format!("config: {e}"));
        }
    }
    config.ensure_valid()?;
    for w in config.warnings() {
        print_warn(&format!("config: {w}"));
    }
    Ok(config)
}

fn build_runner(config: &AppConfig) -> ContinuousRunner {
    let alerts = Alerts::from_config(&config.notify);
    let authenticator = Authenticator::from_config(config, policy_from_config(config));
    let cycle = MonitorCycle::from_config(config, authenticator, alerts.clone());
    let launcher = ChromiumLauncher::new(ChromiumLaunchConfig::from_settings(&config.browser));

    ContinuousRunner::new(
        cycle,
        Box::new(launcher),
        alerts,
        RunnerSettings::from(&config.runner),
    )
}

/// `clubwatch run`
pub async fn run(config: AppConfig, stop: StopSignal) -> anyhow::Result<()> {
    info!(
        favorites = %config.favorites().names().join(", "),
        auto_signup = config.monitor.auto_signup,
        "Favorites (priority order)"
    );

    let mut runner = build_runner(&config);
    let summary = runner.run(&stop).await?;
    info!(
        cycles = summary.cycles,
        failed = summary.failed_cycles,
        signups = summary.signups,
        "Run finished"
    );
    Ok(())
}

/// `clubwatch once`
pub async fn once(config: AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let mut runner = build_runner(&config);
    let report = runner.run_cycle().await?;

    if !report.authenticated {
        bail!("authentication failed; see logs");
    }
    let rows: Vec<MatchRow> = report.all_matches.iter().map(MatchRow::from).collect();
    print_items(&rows, mode)?;

    if report.signed_up {
        print_success("Signed up for a favorite this cycle");
    } else {
        print_kv("pages checked", &report.pages_checked.to_string());
    }
    Ok(())
}

/// `clubwatch login`
pub async fn login(mut config: AppConfig) -> anyhow::Result<()> {
    if config.site.username.trim().is_empty() {
        bail!("site.username is not configured");
    }
    if config.site.password.is_empty() {
        let password = rpassword::prompt_password(format!("Password for {}: ", config.site.username))?;
        config.site.password = Secret::new(password);
    }

    // The operator may need to see the browser to finish 2FA
    let mut settings = config.browser.clone();
    settings.headless = false;
    let launcher = ChromiumLauncher::new(ChromiumLaunchConfig::from_settings(&settings));

    let policy = Interactive::stdin(config.browser.second_factor_timeout());
    let authenticator = Authenticator::from_config(&config, Box::new(policy));

    let opened = launcher.open().await?;
    let result = authenticator.login(opened.page()).await;
    opened.close().await?;
    result?;

    print_success(&format!(
        "Logged in; session saved to {}",
        authenticator.session_store().path().display()
    ));
    Ok(())
}

/// `clubwatch scan`
pub async fn scan(
    html_path: &Path,
    favorites: Option<Vec<String>>,
    explicit_config: Option<&Path>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(html_path)
        .await
        .with_context(|| format!("Failed to read {}", html_path.display()))?;

    let config = AppConfig::load_from("config", explicit_config).context("Failed to load configuration")?;
    let raw = favorites.unwrap_or_else(|| config.monitor.favorites.clone());
    let favorites = FavoriteList::parse(&raw).map_err(anyhow::Error::msg)?;

    let url = format!("file://{}", html_path.display());
    let page = SnapshotPage::single(&url, &html);
    let matcher = ClubMatcher::new(
        favorites,
        &config.monitor.fallback_keywords,
        config.monitor.max_entries_per_page,
    );

    let rows: Vec<MatchRow> = matcher
        .find_matches(&page)
        .await
        .iter()
        .map(|m| {
            MatchRow::from(&MatchSummary {
                name: m.name.clone(),
                favorite: m.favorite.clone(),
                priority: m.priority,
                page_url: url.clone(),
            })
        })
        .collect();
    print_items(&rows, mode)
}

/// `clubwatch check`
pub async fn check(explicit_config: Option<&Path>, send_test: bool) -> anyhow::Result<()> {
    let config = AppConfig::load_from("config", explicit_config).context("Failed to load configuration")?;

    let valid = match config.validate() {
        Ok(()) => {
            print_success("Configuration is valid");
            true
        }
        Err(errors) => {
            for e in &errors {
                print_error(&format!("error: {e}"));
            }
            false
        }
    };
    for w in config.warnings() {
        print_warn(&format!("warning: {w}"));
    }

    let pages = config.page_urls();
    print_kv("pages", &pages.len().to_string());
    if let (Some(first), Some(last)) = (pages.first(), pages.last()) {
        print_kv("first page", first);
        print_kv("last page", last);
    }
    print_kv("favorites", &config.favorites().names().join(" > "));
    print_kv("auto-signup", &config.monitor.auto_signup.to_string());
    print_kv("second factor", &format!("{:?}", config.browser.second_factor));
    print_kv("session file", &config.browser.session_file.display().to_string());

    if send_test {
        let alerts = Alerts::from_config(&config.notify);
        if alerts.send("8th Period Monitor test notification").await {
            print_success("Test notification sent");
        } else {
            print_error("Test notification failed");
        }
    }

    if !valid {
        bail!("invalid configuration");
    }
    Ok(())
}
