//! `tabload check` command implementation
//!
//! Opens a session with the current settings and reports what the server sees.

use colored::Colorize;
use tabload_engine::{Connector, EngineError, PgConnector, Store};
use tracing::warn;

use super::connection_config;
use crate::error::{CliError, Result};

pub async fn run(schema: Option<&str>) -> Result<()> {
    let config = connection_config(schema)?;
    println!("{} Connecting to {}", "→".cyan(), config.describe());

    let mut store = PgConnector::new()
        .open(&config)
        .await
        .map_err(EngineError::Connection)?;
    let diagnostics = store.diagnose(&config.namespace).await;
    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close diagnostic session");
    }
    let diagnostics = diagnostics.map_err(EngineError::Connection)?;

    println!("  Server version: {}", diagnostics.server_version);
    println!("  search_path:    {}", diagnostics.search_path);

    if !diagnostics.namespace_exists {
        println!("  Schema:         {} {}", config.namespace, "missing".red());
        return Err(CliError::SchemaMissing(config.namespace));
    }
    println!("  Schema:         {} {}", config.namespace, "found".green());
    println!("{} Connection OK", "✓".green().bold());
    Ok(())
}
