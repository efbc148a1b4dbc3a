//! `tabload load` command implementation
//!
//! Loads one file into the given tables, or every *.csv in a folder into the
//! table named after it.

use tabload_engine::{EngineSettings, Job, LoadJob, SourceOptions};

use super::{connection_config, load_registry, run_job};
use crate::error::{CliError, Result};
use crate::LoadArgs;

pub async fn run(args: &LoadArgs, schema: Option<&str>, json_events: bool) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    let job = build_job(args)?;

    let mut settings = EngineSettings::from_env()?;
    if let Some(chunk_size) = args.chunk_size {
        settings.chunk_size = chunk_size;
    }
    settings.validate()?;

    let config = connection_config(schema)?;
    run_job(config, settings, registry, Job::Load(job), json_events).await
}

/// Translate the arguments into a load job
pub fn build_job(args: &LoadArgs) -> Result<LoadJob> {
    if args.header_row == 0 {
        return Err(CliError::invalid_argument("--header-row is 1-based"));
    }
    let delimiter = args.delimiter.map(delimiter_byte).transpose()?;
    let options = SourceOptions {
        header_row: args.header_row,
        delimiter,
        ..SourceOptions::default()
    };

    let job = match (&args.file, &args.dir) {
        (Some(file), _) => {
            if !file.is_file() {
                return Err(CliError::FileNotFound(file.display().to_string()));
            }
            LoadJob::file(file, args.tables.clone())
        }
        (None, Some(dir)) => {
            if !dir.is_dir() {
                return Err(CliError::FileNotFound(dir.display().to_string()));
            }
            LoadJob::folder(dir)
        }
        (None, None) => return Err(CliError::invalid_argument("either --file or --dir is required")),
    };

    Ok(job
        .with_strategy(args.strategy)
        .with_options(options)
        .dry_run(args.dry_run))
}

fn delimiter_byte(c: char) -> Result<u8> {
    if c.is_ascii() && c != '\n' && c != '\r' && c != '"' {
        Ok(c as u8)
    } else {
        Err(CliError::invalid_argument(format!(
            "delimiter must be a single ASCII character other than a quote or newline, got {:?}",
            c
        )))
    }
}
