//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod check;
pub mod exec;
pub mod load;
pub mod tables;

use colored::Colorize;
use std::path::Path;
use std::time::Duration;
use tabload_engine::{
    CancellationToken, ConnectionConfig, EngineSettings, Job, Orchestrator, PgConnector,
    RunOutcome, SchemaRegistry,
};
use tracing::info;

use crate::error::{CliError, Result};
use crate::progress::{drive, EventSink};

/// Connection settings from the environment, with the `--schema` override
pub fn connection_config(schema: Option<&str>) -> Result<ConnectionConfig> {
    let mut config = ConnectionConfig::from_env()?;
    if let Some(schema) = schema {
        config.namespace = schema.to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Read a registry file, with a clear message when it is missing
pub fn load_registry(path: &Path) -> Result<SchemaRegistry> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    Ok(SchemaRegistry::from_path(path)?)
}

/// Spawn `job`, show its events until it ends and map the outcome
pub async fn run_job(
    config: ConnectionConfig,
    settings: EngineSettings,
    registry: SchemaRegistry,
    job: Job,
    json_events: bool,
) -> Result<()> {
    info!(session = %config.describe(), kind = job.kind(), "Starting run");
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);
    let orchestrator =
        Orchestrator::new(std::sync::Arc::new(PgConnector::new()), config, settings)
            .with_registry(registry);

    let sink = EventSink::new(json_events, job.kind());
    let handle = orchestrator.spawn(job, CancellationToken::new());
    let outcome = drive(handle, poll_interval, &sink).await?;
    report_outcome(outcome, json_events)
}

/// Print the summary line and turn failures into errors
pub fn report_outcome(outcome: RunOutcome, json_events: bool) -> Result<()> {
    match outcome {
        RunOutcome::Succeeded { message } => {
            if !json_events {
                println!("{} {}", "✓".green().bold(), message);
            }
            Ok(())
        }
        RunOutcome::Failed { message } => Err(CliError::RunFailed(message)),
        RunOutcome::Cancelled { message } => Err(CliError::Cancelled(message)),
    }
}
