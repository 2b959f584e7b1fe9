use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use docingest::cli::commands::{handle_bootstrap, handle_config, handle_ingest, handle_status};
use docingest::cli::{Cli, Commands};

/// 128 + SIGINT, what shells report for an interrupted command.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "docingest=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tokio::select! {
        result = run_command(cli) => result,
        _ = shutdown_signal() => {
            // The command future is already dropped here, and with it any
            // tunnel session, whose Drop kills the forwarder.
            warn!("received shutdown signal, exiting");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let Cli {
        format,
        config_dir,
        command,
        ..
    } = cli;

    match command {
        Commands::Config(cmd) => handle_config(cmd, &config_dir, format).await,
        Commands::Bootstrap => handle_bootstrap(&config_dir, format).await,
        Commands::Ingest(args) => handle_ingest(args, &config_dir, format).await,
        Commands::Status => handle_status(&config_dir, format).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
