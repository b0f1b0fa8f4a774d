use clap::Parser;
use clubwatch::cli::commands;
use clubwatch::cli::output::OutputMode;
use clubwatch::cli::{Cli, Commands};
use clubwatch::logging::{init_logging, init_logging_simple};
use clubwatch::runner::StopSignal;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = OutputMode::from_json_flag(cli.json);
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Run => {
            let config = commands::load_valid_config(config_path)?;
            let mut logging = config.logging.clone();
            logging.json |= cli.json;
            let _guard = init_logging(&logging);

            let stop = StopSignal::new();
            let on_signal = stop.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("Stop requested, finishing current wait");
                on_signal.stop();
            });

            commands::run(config, stop).await?;
        }
        Commands::Once => {
            let config = commands::load_valid_config(config_path)?;
            let _guard = init_logging(&config.logging);
            commands::once(config, mode).await?;
        }
        Commands::Login => {
            init_logging_simple();
            let config = clubwatch::config::AppConfig::load_from("config", config_path)?;
            commands::login(config).await?;
        }
        Commands::Scan { html, favorites } => {
            init_logging_simple();
            commands::scan(html, favorites.clone(), config_path, mode).await?;
        }
        Commands::Check { send_test } => {
            init_logging_simple();
            commands::check(config_path, *send_test).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        park_on_error(signal::ctrl_c().await, "Ctrl+C").await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => park_on_error(Err(e), "SIGTERM").await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// A handler that could not be installed must never look like a signal.
async fn park_on_error(installed: std::io::Result<()>, name: &str) {
    if let Err(e) = installed {
        error!("Failed to install {} handler: {}", name, e);
        std::future::pending::<()>().await;
    }
}
