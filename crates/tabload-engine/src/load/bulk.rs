use tracing::{debug, info};

use super::LoadOutcome;
use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::store::{Store, StoreError};

/// Serialize a dataset as PostgreSQL COPY text: tab-separated fields, one row
/// per line, empty field for null.
///
/// Backslash, tab, newline and carriage return inside values are escaped so a
/// value can never split a field or a row. An empty text value cannot be told
/// apart from null in this format and loads as null.
pub fn encode_copy_text(dataset: &Dataset) -> Vec<u8> {
    let mut out = String::new();
    for row in dataset.rows() {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            if let Some(text) = value.render() {
                escape_into(&mut out, &text);
            }
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

/// Loads a whole dataset in one atomic bulk transfer
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkCopyLoader;

impl BulkCopyLoader {
    pub fn new() -> Self {
        Self
    }

    /// Copy `dataset` into `table` in a single transaction.
    ///
    /// An empty dataset succeeds without touching the store. The target is
    /// checked for visibility first; a session that cannot see it fails with
    /// [`EngineError::Visibility`] and is not retried.
    pub async fn load<S>(
        &self,
        store: &mut S,
        table: &str,
        dataset: &Dataset,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome>
    where
        S: Store + ?Sized,
    {
        if dataset.is_empty() {
            debug!(table, "Nothing to copy");
            return Ok(LoadOutcome::Completed { rows: 0, chunks: 0 });
        }

        if cancel.is_cancelled() {
            return Ok(LoadOutcome::Cancelled {
                rows_committed: 0,
                chunks_committed: 0,
            });
        }

        let namespace = store.namespace().to_string();
        let visible = store
            .table_visible(table)
            .await
            .map_err(|source| bulk_error(table, source))?;
        if !visible {
            return Err(EngineError::Visibility {
                table: table.to_string(),
                namespace,
            });
        }

        let payload = encode_copy_text(dataset);
        let bytes = payload.len();
        let rows = store
            .copy_in(table, dataset.columns(), payload)
            .await
            .map_err(|source| match source {
                StoreError::NotVisible(_) => EngineError::Visibility {
                    table: table.to_string(),
                    namespace: namespace.clone(),
                },
                source => bulk_error(table, source),
            })?;

        info!(table, rows, bytes, "Bulk copy committed");
        Ok(LoadOutcome::Completed { rows, chunks: 1 })
    }
}

fn bulk_error(table: &str, source: StoreError) -> EngineError {
    EngineError::BulkWrite {
        table: table.to_string(),
        source,
    }
}
