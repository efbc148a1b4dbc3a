//! Error types for the tabload CLI
//!
//! Messages are user-facing and say what to check or change.

use tabload_engine::EngineError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for a run stopped by the user (128 + SIGINT)
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Error, Debug)]
pub enum CliError {
    /// Engine rejected the configuration or the run could not start
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the path exists and you have read permissions.")]
    FileNotFound(String),

    /// Command-line value the engine cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema the session should be pinned to does not exist
    #[error("Schema '{0}' does not exist. Create it or set DB_SCHEMA to an existing schema.")]
    SchemaMissing(String),

    /// Run finished with failures
    #[error("Run failed: {0}")]
    RunFailed(String),

    /// Run stopped at a cancellation check
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions.")]
    Io(#[from] std::io::Error),

    /// Event serialization failed
    #[error("Failed to encode event: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure with the path it happened on
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Cancelled(_) => EXIT_CANCELLED,
            _ => 1,
        }
    }
}
