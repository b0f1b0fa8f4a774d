pub mod auth;
pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod monitor;
pub mod notify;
pub mod runner;
pub mod session;
pub mod signup;

pub use auth::{Authenticator, Interactive, OperatorSignal, SecondFactorPolicy, Unattended};
pub use browser::{BrowserPage, Locator, PageElement, SnapshotPage};
pub use config::AppConfig;
pub use error::{Result, WatchError};
pub use matcher::{ClubMatcher, FavoriteList, Match};
pub use monitor::{CycleReport, MatchSummary, MonitorCycle};
pub use notify::{Alerts, Notifier};
pub use runner::{ContinuousRunner, RunSummary, StopSignal};
pub use session::SessionStore;
pub use signup::{classify_result, PreviousSignups, SignupExecutor, SignupOutcome};
