//! Tabload CLI Library
//!
//! Command-line front end for the tabload engine.
//!
//! # Overview
//!
//! - **Connection check**: server version, search path and schema (`tabload check`)
//! - **Registry listing**: tables and scripts a registry file defines (`tabload tables`)
//! - **Loading**: one file into chosen tables, or a whole folder (`tabload load`)
//! - **Scripts**: inline SQL, a script file or registry tasks (`tabload exec`)
//!
//! Database settings come from the environment (`DB_HOST`, `DB_PORT`, `DB_NAME`,
//! `DB_USER`, `DB_PASS`, `DB_SCHEMA`), optionally through a `.env` file.

pub mod commands;
pub mod error;
pub mod progress;

pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tabload_engine::LoadStrategy;

/// Tabload - batch loader and SQL runner for PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Schema to pin the session to (overrides DB_SCHEMA)
    #[arg(long, global = true)]
    pub schema: Option<String>,

    /// Print progress events as JSON lines instead of a progress bar
    #[arg(long, global = true)]
    pub json_events: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and report server version, search path and schema
    Check,

    /// List the tables and scripts defined in a registry file
    Tables {
        /// Registry file (YAML)
        #[arg(short, long, env = "TABLOAD_REGISTRY", default_value = "tables.yaml")]
        registry: PathBuf,
    },

    /// Load delimited files into tables
    Load(LoadArgs),

    /// Run a SQL script statement by statement
    Exec(ExecArgs),
}

/// Arguments of `tabload load`
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Registry file (YAML)
    #[arg(short, long, env = "TABLOAD_REGISTRY", default_value = "tables.yaml")]
    pub registry: PathBuf,

    /// Source file to load
    #[arg(short, long, conflicts_with = "dir", requires = "tables")]
    pub file: Option<PathBuf>,

    /// Target table for --file (repeatable)
    #[arg(short, long = "table", value_name = "TABLE")]
    pub tables: Vec<String>,

    /// Folder of *.csv files, one table per file
    #[arg(short, long, required_unless_present = "file")]
    pub dir: Option<PathBuf>,

    /// Load strategy: chunked or bulk
    #[arg(short, long, default_value_t = LoadStrategy::Chunked)]
    pub strategy: LoadStrategy,

    /// 1-based line holding the header
    #[arg(long, default_value_t = 1)]
    pub header_row: usize,

    /// Field delimiter; detected from the first line when omitted
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Rows per committed chunk (chunked strategy)
    #[arg(long, env = "TABLOAD_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Read and convert the files without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments of `tabload exec`
#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("input")
        .required(true)
        .args(["sql", "script", "tasks"]),
))]
pub struct ExecArgs {
    /// Inline SQL
    #[arg(long)]
    pub sql: Option<String>,

    /// File holding the script
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Registry script to run (repeatable, runs in the order given)
    #[arg(long = "task", value_name = "NAME")]
    pub tasks: Vec<String>,

    /// Registry file (YAML), needed for --task
    #[arg(short, long, env = "TABLOAD_REGISTRY", default_value = "tables.yaml")]
    pub registry: PathBuf,

    /// Split on terminators outside quotes, comments and dollar-quoted bodies
    #[arg(long)]
    pub quote_aware: bool,
}
