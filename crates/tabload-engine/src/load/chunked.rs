use tracing::{debug, info};

use super::LoadOutcome;
use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::progress::{floor_percent, ProgressSender};
use crate::store::{Store, StoreError};

/// Loads a dataset in independently committed chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkedLoader {
    chunk_size: usize,
}

impl Default for ChunkedLoader {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

impl ChunkedLoader {
    /// `chunk_size` is clamped to at least one row
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write `dataset` into `table`.
    ///
    /// The token is checked before every chunk. A chunk that fails is rolled
    /// back by the store and reported as [`EngineError::ChunkWrite`]; earlier
    /// chunks stay committed either way.
    pub async fn load<S>(
        &self,
        store: &mut S,
        table: &str,
        dataset: &Dataset,
        cancel: &CancellationToken,
        events: &ProgressSender,
    ) -> Result<LoadOutcome>
    where
        S: Store + ?Sized,
    {
        let total = dataset.len() as u64;
        let chunks = dataset.chunk_count(self.chunk_size);
        let namespace = store.namespace().to_string();
        let mut committed = 0u64;

        debug!(table, rows = total, chunks, chunk_size = self.chunk_size, "Starting chunked load");

        for (index, chunk) in dataset.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                info!(
                    table,
                    chunks_committed = index,
                    rows_committed = committed,
                    "Cancelled before chunk {}",
                    index + 1
                );
                return Ok(LoadOutcome::Cancelled {
                    rows_committed: committed,
                    chunks_committed: index,
                });
            }

            store
                .insert_chunk(table, dataset.columns(), chunk)
                .await
                .map_err(|source| match source {
                    StoreError::NotVisible(_) => EngineError::Visibility {
                        table: table.to_string(),
                        namespace: namespace.clone(),
                    },
                    source => EngineError::ChunkWrite {
                        table: table.to_string(),
                        chunk: index + 1,
                        source,
                    },
                })?;

            committed += chunk.len() as u64;
            let percent = floor_percent(committed, total);
            events.progress(
                percent,
                format!("{}: {}/{} rows ({}%)", table, committed, total, percent),
            );
        }

        Ok(LoadOutcome::Completed {
            rows: committed,
            chunks,
        })
    }
}
