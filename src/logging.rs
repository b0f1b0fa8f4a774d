//! Tracing subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub const LOG_DIR_ENV: &str = "CLUBWATCH_LOG_DIR";

fn default_directives(level: &str) -> String {
    format!("{level},clubwatch=debug,chromiumoxide=warn,hyper=warn,reqwest=warn")
}

/// Install the long-running subscriber: console (plain or JSON) plus a
/// daily-rolling file in `$CLUBWATCH_LOG_DIR` when that is set and writable.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => match file_writer(&dir) {
            Some((writer, guard)) => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                ),
                Some(guard),
            ),
            None => (None, None),
        },
        Err(_) => (None, None),
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
    });
    let plain_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init();

    if file_logging_enabled {
        tracing::info!("File logging enabled");
    }
    guard
}

/// Warnings-only console logging for one-shot commands.
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}

/// `tracing_appender::rolling::daily` panics if it cannot create its first
/// file, so writability is checked up front.
fn file_writer(
    dir: &str,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: Could not create log directory {dir} ({e}), file logging disabled");
        return None;
    }

    let probe = std::path::Path::new(dir).join(".clubwatch_write_test");
    match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            let appender = tracing_appender::rolling::daily(dir, "clubwatch.log");
            Some(tracing_appender::non_blocking(appender))
        }
        Err(e) => {
            eprintln!("Warning: Could not write to log directory {dir} ({e}), file logging disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives("info");
        assert!(directives.starts_with("info,clubwatch=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }

    #[test]
    fn test_unwritable_log_dir_disables_file_logging() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        assert!(file_writer(blocker.to_str().unwrap()).is_none());
    }
}
