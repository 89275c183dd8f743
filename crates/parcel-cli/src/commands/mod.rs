//! Command implementations

mod bbox;
mod config;
mod import;
mod inspect;

use crate::cli::{Cli, Commands};
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use parcel_core::models::CooperativeId;
use parcel_import::{CancellationToken, ImportSession, ParsePipeline};
use parcel_store::MemoryStore;
use std::path::Path;
use uuid::Uuid;

/// Execute a CLI command
pub async fn execute(cli: Cli, output: &OutputWriter) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.overrides.to_overrides())?;

    match cli.command {
        Commands::Inspect(args) => inspect::execute(args, &config, output).await,
        Commands::Import(args) => import::execute(args, &config, output).await,
        Commands::Bbox(args) => bbox::execute(args, &config, output).await,
        Commands::Config => config::execute(&config, output),
    }
}

/// Upload and parse one file into `store`
pub(crate) async fn parse_file(
    store: &MemoryStore,
    pipeline: &ParsePipeline,
    cooperative_id: CooperativeId,
    path: &Path,
    output: &OutputWriter,
) -> Result<ImportSession> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut session =
        ImportSession::upload(store, pipeline.settings(), cooperative_id, filename, bytes).await?;
    let report = session
        .parse(pipeline, store, &CancellationToken::new())
        .await?;

    for warning in &report.warnings {
        output.warning(format!("{}: {}", warning.code, warning.message));
    }

    Ok(session)
}

pub(crate) fn new_cooperative() -> CooperativeId {
    CooperativeId(Uuid::new_v4())
}
