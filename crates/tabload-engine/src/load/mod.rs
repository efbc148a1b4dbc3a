//! Dataset loaders
//!
//! Two strategies with different trade-offs, always chosen by the caller:
//!
//! - [`ChunkedLoader`]: parameterized multi-row inserts, one transaction per
//!   chunk. Progress after every chunk; committed chunks survive a later
//!   failure or cancellation.
//! - [`BulkCopyLoader`]: the whole dataset in a single bulk transfer. All rows
//!   or none, no intermediate progress.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod bulk;
mod chunked;

pub use bulk::{encode_copy_text, BulkCopyLoader};
pub use chunked::ChunkedLoader;

/// Which loader a load run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    #[default]
    Chunked,
    Bulk,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Chunked => f.write_str("chunked"),
            LoadStrategy::Bulk => f.write_str("bulk"),
        }
    }
}

impl FromStr for LoadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunked" => Ok(LoadStrategy::Chunked),
            "bulk" | "copy" => Ok(LoadStrategy::Bulk),
            other => Err(format!("unknown load strategy '{}'", other)),
        }
    }
}

/// How a single table load ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed { rows: u64, chunks: usize },
    /// Stopped at a cancellation check; everything committed before it stays
    Cancelled { rows_committed: u64, chunks_committed: usize },
}

impl LoadOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadOutcome::Cancelled { .. })
    }
}
