//! Parcel CLI - Command-line interface
//!
//! Runs imports against an in-memory store, one file per invocation.

mod cli;
mod commands;
mod config_loader;
mod output;

use clap::Parser;
use cli::Cli;
use output::OutputWriter;
use parcel_core::ParcelError;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(commands::execute(cli, &output)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = match err.downcast_ref::<ParcelError>() {
                Some(parcel_err) => parcel_err.report(),
                None => parcel_core::ErrorReport {
                    code: "CLI".to_string(),
                    message: format!("{:#}", err),
                    details: serde_json::Value::Null,
                },
            };
            output.error(&report);
            ExitCode::FAILURE
        }
    }
}
