//! treemirror: mirror a directory into another on a fixed interval.

mod cli;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use cli::Cli;
use treemirror_lib::{logging, Scheduler};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&config.log_file, config.verbose) {
        eprintln!("error: {}", e);
        return ExitCode::from(2);
    }

    info!(
        source = %config.source.display(),
        destination = %config.destination.display(),
        interval_secs = config.interval.as_secs(),
        log_file = %config.log_file.display(),
        "Starting treemirror"
    );

    let service = Arc::new(config.service());

    if config.run_once {
        let outcome = match tokio::task::spawn_blocking(move || service.try_run()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Synchronization task panicked");
                return ExitCode::FAILURE;
            }
        };
        return if outcome.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let scheduler = Scheduler::start(service, config.interval);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested, waiting for the current run to finish");
    scheduler.stop().await;

    ExitCode::SUCCESS
}
