//! csv-tunnel-load - Main entry point.
//!
//! Streams a CSV file into PostgreSQL through an SSH tunnel.

use clap::Parser;
use csv_tunnel_load::config::{Cli, LoggingArgs};
use csv_tunnel_load::stream_csv_to_postgres;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout is reserved for the progress lines.
fn init_tracing(logging: &LoggingArgs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if logging.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let cli = Cli::parse();

    init_tracing(&cli.logging);

    info!("Starting csv-tunnel-load v{}", env!("CARGO_PKG_VERSION"));

    let (settings, request) = cli.into_parts();

    match stream_csv_to_postgres(&settings, &request).await {
        Ok(report) => {
            info!(report = %report, "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Load failed");
            eprintln!("Error: {}", e);
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
