//! Tabload CLI - Main entry point

use clap::Parser;
use std::process;
use tabload_cli::{commands, Cli, Commands};
use tabload_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Progress already goes to the bar, so the console log stays quiet unless asked
    let base = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("tabload")
        .build();
    let log_config = base.clone().with_env_overrides().unwrap_or(base);

    // The CLI works without logging
    let guard = init_logging(&log_config).ok();

    let code = match execute_command(&cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    drop(guard);
    process::exit(code);
}

async fn execute_command(cli: &Cli) -> tabload_cli::Result<()> {
    let schema = cli.schema.as_deref();

    match &cli.command {
        Commands::Check => commands::check::run(schema).await,
        Commands::Tables { registry } => commands::tables::run(registry).await,
        Commands::Load(args) => commands::load::run(args, schema, cli.json_events).await,
        Commands::Exec(args) => commands::exec::run(args, schema, cli.json_events).await,
    }
}
