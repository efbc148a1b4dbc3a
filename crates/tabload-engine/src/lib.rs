//! Tabload engine
//!
//! Batch ingestion and SQL execution against a relational store. Delimited
//! source files are decoded, converted into typed rows using a schema registry
//! and written either in independently committed chunks or in one atomic bulk
//! copy. SQL scripts run statement by statement. Every run happens on its own
//! background task with its own session and reports through a progress
//! channel; cancellation is cooperative.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabload_engine::{
//!     CancellationToken, ConnectionConfig, EngineSettings, Job, LoadJob, Orchestrator,
//!     PgConnector, SchemaRegistry,
//! };
//!
//! # async fn example() -> tabload_engine::Result<()> {
//! let registry = SchemaRegistry::from_path("tables.yaml")?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(PgConnector::new()),
//!     ConnectionConfig::from_env()?,
//!     EngineSettings::from_env()?,
//! )
//! .with_registry(registry);
//!
//! let job = Job::Load(LoadJob::file("tab01.csv", vec!["tab01".to_string()]));
//! let handle = orchestrator.spawn(job, CancellationToken::new());
//! let (outcome, _events) = handle.finish().await;
//! println!("{}", outcome.message());
//! # Ok(())
//! # }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cancel;
pub mod coercion;
pub mod config;
pub mod connection;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod load;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod source;
pub mod store;

pub use cancel::CancellationToken;
pub use coercion::{CoercionPipeline, CoercionReport};
pub use config::{ConnectionConfig, EngineSettings};
pub use connection::{open_session, ConnectionManager};
pub use dataset::{CellValue, Dataset, RawTable, Row};
pub use error::{EngineError, Result};
pub use executor::{split_statements, ScriptOutcome, Splitter, SqlBatchExecutor};
pub use load::{BulkCopyLoader, ChunkedLoader, LoadOutcome, LoadStrategy};
pub use orchestrator::{Job, LoadJob, Orchestrator, RunHandle, RunOutcome, ScriptJob, SourceSpec};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use registry::{ColumnRule, NamedScript, SchemaRegistry, TableSchema};
pub use source::{read_source, SourceEncoding, SourceFile, SourceOptions};
pub use store::{Connector, PgConnector, PgStore, Store, StoreError};
