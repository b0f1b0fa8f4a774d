//! Polling waits for page conditions.
//!
//! Used for "page has settled" and "operator finished the second-factor
//! challenge"; both are conditions the page only exposes by being asked.

use crate::error::{Result, WatchError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Default poll interval for checking conditions (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    /// Maximum time to wait for the condition.
    pub timeout: Duration,

    /// How often to check if the condition is satisfied.
    pub poll_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }
}

/// Waits for a fallible condition to become true.
///
/// Errors from the condition are treated like `false`: a page that is
/// mid-navigation rejects script evaluation for a moment. The last error is
/// folded into the timeout message.
pub async fn wait_for_result<F, Fut>(condition: F, config: WaitConfig, description: &str) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let mut last_error: Option<String> = None;

    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => last_error = Some(e.to_string()),
        }

        if start.elapsed() >= config.timeout {
            let step = match last_error {
                Some(err) => format!("{description} (last error: {err})"),
                None => description.to_string(),
            };
            return Err(WatchError::timeout(step, config.timeout));
        }

        sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_succeeds_once_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = wait_for_result(
            || {
                let calls = calls.clone();
                async move { Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
            WaitConfig::new(Duration::from_secs(1), Duration::from_millis(1)),
            "counter",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_times_out_with_last_error() {
        let result = wait_for_result(
            || async { Err(WatchError::Browser("context destroyed".into())) },
            WaitConfig::new(Duration::from_millis(20), Duration::from_millis(5)),
            "document ready",
        )
        .await;

        match result {
            Err(WatchError::Timeout { step, .. }) => {
                assert!(step.contains("document ready"));
                assert!(step.contains("context destroyed"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
