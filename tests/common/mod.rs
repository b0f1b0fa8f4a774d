//! Shared fixtures: an in-memory signup site and a notifier that records
//! what it was asked to send.

#![allow(dead_code)]

use async_trait::async_trait;
use clubwatch::auth::{Authenticator, OperatorSignal, Unattended};
use clubwatch::browser::{LoginGate, OpenPage, PageLauncher, SnapshotPage};
use clubwatch::error::WatchError;
use clubwatch::config::{Secret, SiteConfig};
use clubwatch::matcher::{ClubMatcher, FavoriteList};
use clubwatch::monitor::MonitorCycle;
use clubwatch::notify::{Alerts, Notifier};
use clubwatch::session::SessionStore;
use clubwatch::signup::SignupExecutor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LOGIN: &str = "https://ion.example.test/login";
pub const PROBE: &str = "https://ion.example.test/eighth/";
pub const BASE: &str = "https://ion.example.test/eighth/signup/";
pub const CHALLENGE: &str = "https://ion.example.test/two-factor";
pub const DESTINATION: &str = "5551234567@vtext.example";

pub fn page_url(id: u32) -> String {
    format!("{BASE}{id}")
}

const LOGIN_FORM: &str = r#"<html><body>
<form method="post" action="/login">
  <input type="hidden" name="csrfmiddlewaretoken" value="abc">
  <input type="text" name="username">
  <input type="password" name="password">
  <input type="submit" value="Login">
</form></body></html>"#;

/// An activity row in the site's usual markup.
pub fn activity_row(name: &str, seats: &str, signup_href: Option<&str>) -> String {
    let control = signup_href
        .map(|href| format!(r#"<a class="btn" href="{href}">Sign up</a>"#))
        .unwrap_or_default();
    format!(
        r#"<div class="activity-row">
  <div class="room">Room 214</div>
  <div class="name">{name}</div>
  <div class="sponsor">Sponsor: Ms. Rivera</div>
  <div class="seats">{seats}</div>
  {control}
</div>"#
    )
}

pub fn signup_page(rows: &[String]) -> String {
    format!(
        "<html><body><h2>Eighth Period Signup</h2>{}</body></html>",
        rows.join("\n")
    )
}

/// A site with a login gate over every `/eighth` URL.
pub fn site(pages: Vec<(String, String)>) -> SnapshotPage {
    gated_site(pages, false)
}

/// Like [`site`], but a correct password lands on a second-factor page.
pub fn site_with_second_factor(pages: Vec<(String, String)>) -> SnapshotPage {
    gated_site(pages, true)
}

fn gated_site(pages: Vec<(String, String)>, second_factor: bool) -> SnapshotPage {
    let mut routes = vec![
        (LOGIN.to_string(), LOGIN_FORM.to_string()),
        (PROBE.to_string(), "<html><body><h1>Eighth Period</h1></body></html>".to_string()),
        (
            CHALLENGE.to_string(),
            r#"<html><body><form><input name="otp_token"><button type="submit">Verify</button></form></body></html>"#
                .to_string(),
        ),
    ];
    routes.extend(pages);

    SnapshotPage::with_routes(
        routes,
        Some(LoginGate {
            login_url: LOGIN.to_string(),
            protected_prefix: "https://ion.example.test/eighth".to_string(),
            username: "student".to_string(),
            password: "hunter2".to_string(),
            landing_url: PROBE.to_string(),
            second_factor_url: second_factor.then(|| CHALLENGE.to_string()),
        }),
    )
}

/// An operator who finishes the challenge in the browser straight away.
pub struct CompleteChallenge(pub SnapshotPage);

#[async_trait]
impl OperatorSignal for CompleteChallenge {
    async fn wait(&self) -> clubwatch::Result<()> {
        self.0.complete_second_factor().await;
        Ok(())
    }
}

/// Fails to start a browser `failures` times, then opens the site.
pub struct FlakyLauncher {
    page: SnapshotPage,
    failures: AtomicU32,
}

impl FlakyLauncher {
    pub fn new(page: SnapshotPage, failures: u32) -> Self {
        Self {
            page,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl PageLauncher for FlakyLauncher {
    async fn open(&self) -> clubwatch::Result<Box<dyn OpenPage>> {
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(WatchError::Browser("Chrome failed to start".to_string()));
        }
        self.page.open().await
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_plain_text(&self, destination: &str, body: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        true
    }
}

pub fn site_config() -> SiteConfig {
    SiteConfig {
        login_url: LOGIN.to_string(),
        auth_probe_url: PROBE.to_string(),
        username: "student".to_string(),
        password: Secret::new("hunter2"),
        ..SiteConfig::default()
    }
}

pub fn favorites(names: &[&str]) -> FavoriteList {
    let raw: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    FavoriteList::parse(&raw).unwrap()
}

/// A cycle over pages `1..=page_count` with no rate-limit delay.
pub fn session_store(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::new(dir.path().join("ion_session.json"))
}

pub fn cycle(
    dir: &tempfile::TempDir,
    notifier: &RecordingNotifier,
    favorite_names: &[&str],
    page_count: u32,
    auto_signup: bool,
) -> MonitorCycle {
    let authenticator = Authenticator::new(
        site_config(),
        session_store(dir),
        Box::new(Unattended),
        Duration::from_secs(2),
    );
    let alerts = Alerts::new(Arc::new(notifier.clone()), DESTINATION);

    MonitorCycle::new(
        authenticator,
        ClubMatcher::new(favorites(favorite_names), &["club".to_string()], 20),
        SignupExecutor::new(alerts.clone(), Duration::from_secs(2), Duration::from_secs(2)),
        alerts,
        (1..=page_count).map(page_url).collect(),
    )
    .with_auto_signup(auto_signup)
    .with_rate_limit(Duration::ZERO)
    .with_navigation_timeout(Duration::from_secs(2))
}
