//! Command-line surface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Club signup monitor.
#[derive(Parser, Debug)]
#[command(name = "clubwatch")]
#[command(version)]
#[command(
    about = "Watch eighth-period signup pages for favorite clubs and sign up automatically",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file layered over config/default.toml
    #[arg(short, long, global = true, env = "CLUBWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON output (logs for `run`, results for one-shot commands)
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor continuously until Ctrl-C / SIGTERM
    Run,

    /// Run a single monitoring cycle and print what was found
    Once,

    /// Log in (completing 2FA by hand if asked) and save the session
    Login,

    /// Offline: rank favorite matches in a saved signup page
    Scan {
        /// Saved HTML of a signup page
        html: PathBuf,
        /// Favorites to use instead of the configured ones (comma-separated)
        #[arg(long, value_delimiter = ',')]
        favorites: Option<Vec<String>>,
    },

    /// Validate configuration and show the monitoring plan
    Check {
        /// Also send a test notification
        #[arg(long)]
        send_test: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan_with_favorites() {
        let cli = Cli::parse_from([
            "clubwatch",
            "scan",
            "page.html",
            "--favorites",
            "Investment Club,FBLA",
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Scan { html, favorites } => {
                assert_eq!(html, PathBuf::from("page.html"));
                assert_eq!(favorites.unwrap(), vec!["Investment Club", "FBLA"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["clubwatch", "check", "--config", "monitor.toml", "--send-test"]);
        assert_eq!(cli.config, Some(PathBuf::from("monitor.toml")));
        assert!(matches!(cli.command, Commands::Check { send_test: true }));
    }
}
