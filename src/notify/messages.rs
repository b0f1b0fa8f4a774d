//! Message bodies sent to the operator.

use chrono::{DateTime, TimeZone};

/// Matches listed in an availability summary.
pub const SUMMARY_LIMIT: usize = 5;

pub fn signup_success<Tz>(club: &str, url: &str, at: DateTime<Tz>, detail: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "AUTO-SIGNUP SUCCESS!\n\n{club}\nPage: {url}\nTime: {}\n\n{detail}",
        at.format("%H:%M:%S")
    )
}

pub fn favorites_available<S: AsRef<str>>(names: &[S]) -> String {
    let mut lines = vec!["Available favorites found (auto-signup disabled):".to_string()];
    lines.extend(
        names
            .iter()
            .take(SUMMARY_LIMIT)
            .map(|n| format!("- {}", n.as_ref())),
    );
    lines.join("\n")
}

pub fn error_report(error: &str) -> String {
    format!("8th Period Monitor Error:\n{error}")
}
