//! `offsetting` -- flags ssvid whose positions are too far from the
//! satellites that reportedly received them.
//!
//! Exits 0 on success and 1 on any failure. See [`offsetting_cli::config`]
//! for the environment variables read at startup.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use offsetting_cli::app;
use offsetting_cli::cli::Cli;
use offsetting_cli::config::EnvConfig;
use offsetting_cli::logging;
use offsetting_pipeline::RunOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = match logging::level_from_env(cli.common.verbosity()) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(level);

    let config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling running jobs");
            on_signal.cancel();
        }
    });

    match app::run(&cli, &config, cancel).await {
        Ok(RunOutcome::Rendered(queries)) => {
            for query in queries {
                println!("-- {}\n{}\n", query.label, query.sql.trim_end());
            }
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed(summary)) => {
            tracing::info!(
                operation = summary.operation,
                queries = summary.queries,
                bytes_processed = summary.bytes_processed,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
