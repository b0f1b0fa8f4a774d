//! End-to-end monitoring over an in-memory signup site.

mod common;

use clubwatch::auth::{Authenticator, Interactive};
use clubwatch::browser::{BrowserPage, SnapshotPage};
use clubwatch::error::WatchError;
use clubwatch::notify::Alerts;
use clubwatch::runner::{ContinuousRunner, RunnerSettings, StopSignal};
use common::*;
use std::sync::Arc;
use std::time::Duration;

const TOP: &str = "Investment Club";
const SECOND: &str = "Future Business Leaders of America (FBLA)";

fn done_page() -> String {
    r#"<html><body><div class="alert-success">You have been signed up for Investment Club.</div></body></html>"#
        .to_string()
}

/// Three pages; only page 2 lists the top favorite.
fn three_page_site() -> SnapshotPage {
    site(three_page_routes())
}

fn three_page_routes() -> Vec<(String, String)> {
    vec![
        (
            page_url(1),
            signup_page(&[activity_row("Chess and Strategy Games", "4/20", Some("/eighth/signup/1/go"))]),
        ),
        (
            page_url(2),
            signup_page(&[
                activity_row(SECOND, "10/25", Some("/eighth/signup/2/fbla")),
                activity_row(TOP, "12/30", Some("/eighth/signup/2/done")),
            ]),
        ),
        (
            page_url(3),
            signup_page(&[activity_row("Investment Club Advanced", "1/15", Some("/eighth/signup/3/done"))]),
        ),
        (format!("{}/done", page_url(2)), done_page()),
    ]
}

/// Only the best match on page 2 is attempted, and a success ends the
/// cycle before page 3 is loaded.
#[tokio::test]
async fn test_signup_on_page_two_stops_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let mut cycle = cycle(&dir, &notifier, &["Investment Club", "FBLA"], 3, true);
    let page = three_page_site();

    let report = cycle.run(&page).await.unwrap();

    assert!(report.signed_up, "expected the cycle to report a signup");
    assert_eq!(report.pages_checked, 2);
    assert!(
        !page.visits().await.contains(&page_url(3)),
        "page 3 must not be visited after a successful signup"
    );

    // Login, then exactly one signup click
    assert_eq!(page.clicks().await, vec!["Login".to_string(), "Sign up".to_string()]);
    assert!(cycle.executor().already_signed_up(TOP));

    let bodies = notifier.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].starts_with(&format!(
        "AUTO-SIGNUP SUCCESS!\n\n{TOP}\nPage: {}/done\nTime: ",
        page_url(2)
    )));
    assert!(bodies[0].ends_with("You have been signed up for Investment Club."));
    assert_eq!(notifier.destinations(), vec![DESTINATION.to_string()]);
}

/// A club in the previous-signups set is never attempted again.
#[tokio::test]
async fn test_previous_signup_is_not_repeated() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let cycle = cycle(&dir, &notifier, &["Investment Club", "FBLA"], 3, true);
    let page = three_page_site();

    let mut runner = ContinuousRunner::new(
        cycle,
        Box::new(page.clone()),
        Alerts::new(Arc::new(notifier.clone()), DESTINATION),
        RunnerSettings {
            cycle_interval: Duration::ZERO,
            error_cooldown: Duration::ZERO,
            max_cycles: Some(3),
        },
    );
    let summary = runner.run(&StopSignal::new()).await.unwrap();

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.signups, 1);

    let reserved = format!("{}/done", page_url(2));
    let reservations = page.visits().await.iter().filter(|u| **u == reserved).count();
    assert_eq!(reservations, 1, "the reserved club must not be signed up for again");

    // Later cycles skip the reserved club and sweep through page 3
    assert!(page.visits().await.contains(&page_url(3)));
    assert_eq!(notifier.bodies().len(), 1);
    assert!(runner.cycle().executor().already_signed_up(TOP));
}

/// With auto-signup off, matches produce one capped summary and no clicks.
#[tokio::test]
async fn test_auto_signup_disabled_sends_summary() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let mut cycle = cycle(&dir, &notifier, &["Investment Club", "FBLA"], 3, false);
    let page = three_page_site();

    let report = cycle.run(&page).await.unwrap();

    assert!(!report.signed_up);
    assert!(report.found_matches());
    assert_eq!(report.pages_checked, 3);
    assert_eq!(page.clicks().await, vec!["Login".to_string()]);

    let bodies = notifier.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0],
        format!(
            "Available favorites found (auto-signup disabled):\n- {TOP}\n- {SECOND}\n- Investment Club Advanced"
        )
    );
}

/// A mid-cycle redirect to the login page triggers exactly one recovery,
/// after which the same page is loaded again and scanned.
#[tokio::test]
async fn test_session_expiry_recovers_and_resumes_same_page() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let mut cycle = cycle(&dir, &notifier, &["Investment Club"], 3, false);
    let page = three_page_site();
    page.expire_session_on_visit(&page_url(2)).await;

    let report = cycle.run(&page).await.unwrap();

    let logins = page.clicks().await.iter().filter(|c| c.as_str() == "Login").count();
    assert_eq!(logins, 2, "initial login plus one recovery");

    let visits = page.visits().await;
    let page_two_loads = visits.iter().filter(|u| **u == page_url(2)).count();
    assert_eq!(page_two_loads, 2, "page 2 is requested again after recovery");
    let last_page_two = visits.iter().rposition(|u| *u == page_url(2)).unwrap();
    let page_three = visits.iter().position(|u| *u == page_url(3)).unwrap();
    assert!(last_page_two < page_three);

    assert!(report.all_matches.iter().any(|m| m.page_url == page_url(2)));
}

/// When recovery fails the page is skipped and later pages are still
/// visited.
#[tokio::test]
async fn test_failed_recovery_skips_page_only() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let mut cycle = cycle(&dir, &notifier, &["Investment Club"], 3, false);
    let page = three_page_site();

    // A stored session lets the cycle start without sending credentials
    assert!(cycle.authenticator().authenticate(&page).await);
    page.reject_logins(true).await;
    page.expire_session_on_visit(&page_url(2)).await;

    let report = cycle.run(&page).await.unwrap();

    assert!(report.authenticated);
    assert_eq!(report.pages_checked, 3);
    assert!(page.visits().await.contains(&page_url(3)));
    assert!(report.all_matches.iter().all(|m| m.page_url != page_url(2)));
    assert!(report.all_matches.iter().all(|m| m.page_url != page_url(3)));
}

/// A second-factor challenge met while recovering an expired session
/// cannot be answered unattended: the cycle stops there and the runner
/// gives up instead of re-sending credentials for every remaining page.
#[tokio::test]
async fn test_second_factor_during_recovery_stops_runner() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let page = site_with_second_factor(three_page_routes());

    // An operator logged in earlier and left a session behind
    let operator = Authenticator::new(
        site_config(),
        session_store(&dir),
        Box::new(Interactive::new(CompleteChallenge(page.clone()), Duration::from_secs(2))),
        Duration::from_secs(2),
    );
    operator.login(&page).await.unwrap();
    page.expire_session_on_visit(&page_url(2)).await;

    let cycle = cycle(&dir, &notifier, &["Investment Club"], 3, false);
    let mut runner = ContinuousRunner::new(
        cycle,
        Box::new(page.clone()),
        Alerts::new(Arc::new(notifier.clone()), DESTINATION),
        RunnerSettings {
            cycle_interval: Duration::ZERO,
            error_cooldown: Duration::ZERO,
            max_cycles: Some(5),
        },
    );

    let err = runner.run(&StopSignal::new()).await.unwrap_err();
    assert!(matches!(err, WatchError::SecondFactorRequired));

    // The operator's login plus a single unattended attempt
    let logins = page.clicks().await.iter().filter(|c| c.as_str() == "Login").count();
    assert_eq!(logins, 2);

    let visits = page.visits().await;
    assert!(!visits.contains(&page_url(3)));
    assert_eq!(visits.iter().filter(|u| **u == page_url(1)).count(), 1);

    let bodies = notifier.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].starts_with("8th Period Monitor Error:\n"));
}

/// A cycle that blows up is reported and the loop carries on.
#[tokio::test]
async fn test_failed_cycle_is_reported_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let cycle = cycle(&dir, &notifier, &["Nonexistent Society"], 1, true);
    let page = three_page_site();

    let mut runner = ContinuousRunner::new(
        cycle,
        Box::new(FlakyLauncher::new(page.clone(), 1)),
        Alerts::new(Arc::new(notifier.clone()), DESTINATION),
        RunnerSettings {
            cycle_interval: Duration::ZERO,
            error_cooldown: Duration::ZERO,
            max_cycles: Some(2),
        },
    );
    let summary = runner.run(&StopSignal::new()).await.unwrap();

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.failed_cycles, 1);
    assert_eq!(summary.signups, 0);
    assert_eq!(
        notifier.bodies(),
        vec!["8th Period Monitor Error:\nBrowser error: Chrome failed to start".to_string()]
    );
    // The second cycle ran against the site
    assert!(page.visits().await.contains(&page_url(1)));
}

/// Credentials that never reach the authenticated area skip the cycle.
#[tokio::test]
async fn test_authentication_failure_skips_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let mut cycle = cycle(&dir, &notifier, &["Investment Club"], 3, true);
    let page = three_page_site();
    page.reject_logins(true).await;

    let report = cycle.run(&page).await.unwrap();

    assert!(!report.authenticated);
    assert_eq!(report.pages_checked, 0);
    assert!(!page.visits().await.contains(&page_url(1)));
    assert!(notifier.bodies().is_empty());
}

/// A stop request ends the runner during its inter-cycle sleep.
#[tokio::test]
async fn test_stop_signal_ends_runner() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();
    let cycle = cycle(&dir, &notifier, &["Nonexistent Society"], 1, true);
    let page = three_page_site();

    let mut runner = ContinuousRunner::new(
        cycle,
        Box::new(page.clone()),
        Alerts::new(Arc::new(notifier.clone()), DESTINATION),
        RunnerSettings {
            cycle_interval: Duration::from_secs(600),
            error_cooldown: Duration::from_secs(120),
            max_cycles: None,
        },
    );

    let stop = StopSignal::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.stop();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), runner.run(&stop))
        .await
        .expect("runner should stop promptly")
        .unwrap();
    assert_eq!(summary.cycles, 1);
    assert_eq!(page.current_url().await.unwrap(), page_url(1));
}
