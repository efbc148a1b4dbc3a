//! `tabload exec` command implementation
//!
//! Runs inline SQL, a script file or named registry scripts.

use anyhow::Context;
use tabload_engine::{EngineSettings, Job, SchemaRegistry, ScriptJob, Splitter};

use super::{connection_config, load_registry, run_job};
use crate::error::{CliError, Result};
use crate::ExecArgs;

pub async fn run(args: &ExecArgs, schema: Option<&str>, json_events: bool) -> Result<()> {
    let (job, registry) = build_job(args)?;

    let mut settings = EngineSettings::from_env()?;
    if args.quote_aware {
        settings.splitter = Splitter::QuoteAware;
    }

    let config = connection_config(schema)?;
    run_job(config, settings, registry, Job::Script(job), json_events).await
}

/// Resolve the script text and name from whichever input was given
pub fn build_job(args: &ExecArgs) -> Result<(ScriptJob, SchemaRegistry)> {
    if let Some(sql) = &args.sql {
        return Ok((ScriptJob::new("inline SQL", sql.clone()), SchemaRegistry::default()));
    }

    if let Some(path) = &args.script {
        if !path.is_file() {
            return Err(CliError::FileNotFound(path.display().to_string()));
        }
        let sql = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script '{}'", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Ok((ScriptJob::new(name, sql), SchemaRegistry::default()));
    }

    if args.tasks.is_empty() {
        return Err(CliError::invalid_argument(
            "one of --sql, --script or --task is required",
        ));
    }
    let registry = load_registry(&args.registry)?;
    let sql = registry.joined_scripts(&args.tasks)?;
    Ok((ScriptJob::new(args.tasks.join(", "), sql), registry))
}
