//! Error types for the ingestion and execution engine
//!
//! Variants follow the failure taxonomy the engine reports on the progress
//! channel. Value-level coercion problems are not errors (bad cells become
//! null) and cancellation is an outcome, so neither appears here.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Connecting or pinning the namespace failed. Fatal for a run; no retry.
    #[error("Connection failed: {0}. Check host, credentials and that the schema exists.")]
    Connection(#[source] StoreError),

    /// An operation was issued while the manager holds no live connection
    #[error("No live database connection. Connect or fix the configuration first.")]
    NotConnected,

    #[error(
        "Column count mismatch for '{table}': the source has {source_columns} columns \
         but the registry expects {schema_columns}"
    )]
    SchemaMismatch {
        table: String,
        source_columns: usize,
        schema_columns: usize,
    },

    /// A table-specific rule set could not be applied at all
    #[error("Type conversion for '{table}' failed: {reason}")]
    Coercion { table: String, reason: String },

    #[error("Chunk {chunk} of '{table}' was rolled back: {source}")]
    ChunkWrite {
        table: String,
        chunk: usize,
        #[source]
        source: StoreError,
    },

    #[error("Bulk copy into '{table}' was rolled back: {source}")]
    BulkWrite {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "Table '{table}' is not visible in schema '{namespace}'. \
         Open a fresh connection after schema changes."
    )]
    Visibility { table: String, namespace: String },

    #[error("Statement {index} failed: {source}")]
    Statement {
        /// 1-based position in the script
        index: usize,
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("The script contains no executable statements")]
    EmptyScript,

    #[error("Table '{0}' is not defined in the schema registry")]
    UnknownTable(String),

    #[error("Failed to read source '{path}': {reason}")]
    Source { path: PathBuf, reason: String },

    #[error("Schema registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn source_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Source {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure only affects the table being loaded.
    ///
    /// Table-scoped failures are reported and the run moves on to the next
    /// table; anything else ends the run.
    pub fn is_table_scoped(&self) -> bool {
        matches!(
            self,
            EngineError::SchemaMismatch { .. }
                | EngineError::Coercion { .. }
                | EngineError::ChunkWrite { .. }
                | EngineError::BulkWrite { .. }
                | EngineError::Visibility { .. }
                | EngineError::UnknownTable(_)
                | EngineError::Source { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_scoped_classification() {
        let mismatch = EngineError::SchemaMismatch {
            table: "tab01".into(),
            source_columns: 5,
            schema_columns: 6,
        };
        assert!(mismatch.is_table_scoped());
        assert!(EngineError::UnknownTable("x".into()).is_table_scoped());

        assert!(!EngineError::NotConnected.is_table_scoped());
        assert!(!EngineError::EmptyScript.is_table_scoped());
        assert!(!EngineError::Statement {
            index: 2,
            statement: "B".into(),
            source: StoreError::Rejected("boom".into()),
        }
        .is_table_scoped());
    }

    #[test]
    fn test_mismatch_message_names_both_counts() {
        let err = EngineError::SchemaMismatch {
            table: "tab03".into(),
            source_columns: 21,
            schema_columns: 22,
        };
        let msg = err.to_string();
        assert!(msg.contains("tab03"));
        assert!(msg.contains("21"));
        assert!(msg.contains("22"));
    }
}
