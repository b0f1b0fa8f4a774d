//! Continuous monitoring loop.
//!
//! Runs a [`MonitorCycle`] on a fresh page, sleeps, repeats. A failed cycle
//! is logged, optionally reported, and followed by a shorter cooldown; the
//! loop itself only ends on a stop request, `max_cycles`, or a failure that
//! no amount of retrying fixes (an unattended second-factor challenge).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::browser::PageLauncher;
use crate::config::RunnerConfig;
use crate::error::{Result, WatchError};
use crate::monitor::{CycleReport, MonitorCycle};
use crate::notify::Alerts;

/// Cooperative stop request shared between the signal handler and the loop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // Sender lives in self, so wait_for only errors if it is dropped
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless stopped first. Returns `false` when the
    /// sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stopped() => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub cycle_interval: Duration,
    pub error_cooldown: Duration,
    pub max_cycles: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RunnerSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            cycle_interval: Duration::from_secs(config.cycle_interval_secs),
            error_cooldown: Duration::from_secs(config.error_cooldown_secs),
            max_cycles: config.max_cycles,
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub signups: u64,
}

pub struct ContinuousRunner {
    cycle: MonitorCycle,
    launcher: Box<dyn PageLauncher>,
    alerts: Alerts,
    settings: RunnerSettings,
}

impl ContinuousRunner {
    pub fn new(
        cycle: MonitorCycle,
        launcher: Box<dyn PageLauncher>,
        alerts: Alerts,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            cycle,
            launcher,
            alerts,
            settings,
        }
    }

    pub fn cycle(&self) -> &MonitorCycle {
        &self.cycle
    }

    /// Run cycles until stopped.
    pub async fn run(&mut self, stop: &StopSignal) -> Result<RunSummary> {
        info!("Starting continuous monitoring");
        info!(
            pages = self.cycle.pages().len(),
            "Monitoring {} pages",
            self.cycle.pages().len()
        );

        let mut summary = RunSummary::default();
        while !stop.is_stopped() {
            summary.cycles += 1;
            let n = summary.cycles;
            info!(cycle = n, "=== Monitoring Cycle {} ===", n);

            let delay = match self.run_cycle().await {
                Ok(report) => {
                    if report.signed_up {
                        summary.signups += 1;
                        info!(cycle = n, "Successful signup completed. Monitoring continues for other periods.");
                    } else if report.found_matches() {
                        info!(cycle = n, matches = report.all_matches.len(), "Favorites found");
                    }
                    self.settings.cycle_interval
                }
                Err(e @ WatchError::SecondFactorRequired) => {
                    self.alerts.cycle_error(&e.to_string()).await;
                    return Err(e);
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    error!(cycle = n, "Unexpected error in monitoring loop: {}", e);
                    self.alerts.cycle_error(&e.to_string()).await;
                    self.settings.error_cooldown
                }
            };

            if self.settings.max_cycles.is_some_and(|max| n >= max) {
                info!(cycles = n, "Reached max_cycles, stopping");
                break;
            }

            info!(cycle = n, next_in = ?delay, "Cycle completed");
            if !stop.sleep(delay).await {
                break;
            }
        }

        info!(cycles = summary.cycles, signups = summary.signups, "Monitoring stopped");
        Ok(summary)
    }

    /// One cycle on a freshly opened page; the page is closed either way.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let opened = self.launcher.open().await?;
        let result = self.cycle.run(opened.page()).await;
        if let Err(e) = opened.close().await {
            warn!("Failed to close browser: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(600)).await });

        stop.stop();
        assert!(!handle.await.unwrap());
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let stop = StopSignal::new();
        assert!(stop.sleep(Duration::from_millis(5)).await);
    }

    #[test]
    fn test_settings_from_config_defaults() {
        let settings = RunnerSettings::default();
        assert_eq!(settings.cycle_interval, Duration::from_secs(600));
        assert_eq!(settings.error_cooldown, Duration::from_secs(120));
        assert_eq!(settings.max_cycles, None);
    }
}
