//! Worker orchestrator
//!
//! [`Orchestrator::spawn`] starts one background worker per job. The worker
//! opens its own session from an immutable config snapshot, drives exactly one
//! loader or the script executor, and reports everything through the progress
//! channel, ending with exactly one terminal event.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::coercion::CoercionPipeline;
use crate::config::{ConnectionConfig, EngineSettings};
use crate::connection::{open_session, ConnectionManager};
use crate::error::{EngineError, Result};
use crate::executor::{ScriptOutcome, SqlBatchExecutor};
use crate::load::{BulkCopyLoader, ChunkedLoader, LoadOutcome, LoadStrategy};
use crate::progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::registry::SchemaRegistry;
use crate::source::{
    delimiter_name, list_source_files, read_source, table_name_for_path, SourceFile,
    SourceOptions,
};
use crate::store::{Connector, Store};

/// Where the rows of a load come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// One file loaded into each of the listed tables
    File { path: PathBuf, tables: Vec<String> },
    /// Every CSV file in a directory, each into the table named by its file name
    Folder { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct LoadJob {
    pub source: SourceSpec,
    pub strategy: LoadStrategy,
    pub options: SourceOptions,
    /// Read, convert and validate without writing anything
    pub dry_run: bool,
}

impl LoadJob {
    pub fn file(path: impl Into<PathBuf>, tables: Vec<String>) -> Self {
        Self {
            source: SourceSpec::File {
                path: path.into(),
                tables,
            },
            strategy: LoadStrategy::default(),
            options: SourceOptions::default(),
            dry_run: false,
        }
    }

    pub fn folder(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: SourceSpec::Folder { dir: dir.into() },
            strategy: LoadStrategy::default(),
            options: SourceOptions::default(),
            dry_run: false,
        }
    }

    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptJob {
    /// Label used in events and logs
    pub name: String,
    pub script: String,
}

impl ScriptJob {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
        }
    }
}

/// One unit of background work
#[derive(Debug, Clone)]
pub enum Job {
    Load(LoadJob),
    Script(ScriptJob),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Load(_) => "load",
            Job::Script(_) => "script",
        }
    }
}

/// Final state of a run, mirroring its terminal event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { message: String },
    Failed { message: String },
    Cancelled { message: String },
}

impl RunOutcome {
    pub fn message(&self) -> &str {
        match self {
            RunOutcome::Succeeded { message }
            | RunOutcome::Failed { message }
            | RunOutcome::Cancelled { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }
}

/// Handle to a running worker
pub struct RunHandle {
    run_id: Uuid,
    events: ProgressReceiver,
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Ask the worker to stop at its next boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn events(&mut self) -> &mut ProgressReceiver {
        &mut self.events
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker and return its outcome
    pub async fn wait(self) -> RunOutcome {
        join_outcome(self.join).await
    }

    /// Wait for the worker and return its outcome plus every event not yet drained
    pub async fn finish(self) -> (RunOutcome, Vec<ProgressEvent>) {
        let outcome = join_outcome(self.join).await;
        let events = self.events.collect().await;
        (outcome, events)
    }
}

async fn join_outcome(join: JoinHandle<RunOutcome>) -> RunOutcome {
    match join.await {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::Failed {
            message: format!("worker aborted: {}", e),
        },
    }
}

/// Spawns workers that each open their own session
pub struct Orchestrator<C: Connector> {
    connector: Arc<C>,
    config: Arc<ConnectionConfig>,
    settings: Arc<EngineSettings>,
    registry: Arc<SchemaRegistry>,
}

impl<C: Connector> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            settings: Arc::clone(&self.settings),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(connector: Arc<C>, config: ConnectionConfig, settings: EngineSettings) -> Self {
        Self {
            connector,
            config: Arc::new(config),
            settings: Arc::new(settings),
            registry: Arc::new(SchemaRegistry::default()),
        }
    }

    /// Build from a manager's current config snapshot
    pub fn from_manager(manager: &ConnectionManager<C>, settings: EngineSettings) -> Result<Self> {
        let config = manager.config_snapshot().ok_or(EngineError::NotConnected)?;
        Ok(Self {
            connector: manager.connector(),
            config,
            settings: Arc::new(settings),
            registry: Arc::new(SchemaRegistry::default()),
        })
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Start `job` on a background task.
    ///
    /// The token is cleared here, before the worker exists, so a cancel left
    /// over from an earlier run cannot stop this one.
    pub fn spawn(&self, job: Job, cancel: CancellationToken) -> RunHandle {
        cancel.reset();
        let (events, receiver) = progress_channel();
        let run_id = Uuid::new_v4();

        let worker = Worker {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            settings: Arc::clone(&self.settings),
            registry: Arc::clone(&self.registry),
            cancel: cancel.clone(),
            events,
        };
        let span = info_span!("run", %run_id, kind = job.kind());
        let join = tokio::spawn(worker.run(job).instrument(span));

        RunHandle {
            run_id,
            events: receiver,
            cancel,
            join,
        }
    }
}

enum TableResult {
    Loaded(u64),
    Empty,
    /// Rows committed before the stop
    Cancelled(u64),
}

#[derive(Default)]
struct LoadTally {
    loaded: usize,
    failed: usize,
    skipped: usize,
    rows: u64,
}

impl LoadTally {
    fn summary(&self) -> String {
        format!(
            "{} loaded, {} failed, {} skipped",
            self.loaded, self.failed, self.skipped
        )
    }
}

struct Worker<C: Connector> {
    connector: Arc<C>,
    config: Arc<ConnectionConfig>,
    settings: Arc<EngineSettings>,
    registry: Arc<SchemaRegistry>,
    cancel: CancellationToken,
    events: ProgressSender,
}

impl<C: Connector> Worker<C> {
    async fn run(self, job: Job) -> RunOutcome {
        let result = match open_session(self.connector.as_ref(), &self.config).await {
            Ok(mut store) => {
                let result = match job {
                    Job::Load(job) => self.run_load(&mut store, job).await,
                    Job::Script(job) => self.run_script(&mut store, job).await,
                };
                if let Err(e) = store.close().await {
                    warn!(error = %e, "Failed to close worker session");
                }
                result
            }
            Err(e) => Err(e),
        };

        let outcome = result.unwrap_or_else(|e| {
            self.events.error(e.to_string());
            RunOutcome::Failed {
                message: e.to_string(),
            }
        });
        self.publish_terminal(&outcome);
        outcome
    }

    fn publish_terminal(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Succeeded { message } => self.events.completed(true, message.clone()),
            RunOutcome::Failed { message } => self.events.completed(false, message.clone()),
            RunOutcome::Cancelled { message } => self.events.cancelled(message.clone()),
        }
    }

    async fn run_script(&self, store: &mut C::Store, job: ScriptJob) -> Result<RunOutcome> {
        let executor =
            SqlBatchExecutor::new(self.settings.statement_terminator, self.settings.splitter);
        self.events.log(format!("Running '{}'", job.name));

        match executor
            .run(store, &job.script, &self.cancel, &self.events)
            .await?
        {
            ScriptOutcome::Completed {
                executed,
                rows_affected,
            } => Ok(RunOutcome::Succeeded {
                message: format!(
                    "'{}' finished: {} statements, {} rows affected",
                    job.name, executed, rows_affected
                ),
            }),
            ScriptOutcome::Cancelled { executed } => Ok(RunOutcome::Cancelled {
                message: format!(
                    "'{}' cancelled after {} statements",
                    job.name, executed
                ),
            }),
        }
    }

    async fn run_load(&self, store: &mut C::Store, job: LoadJob) -> Result<RunOutcome> {
        let plan: Vec<(PathBuf, Vec<String>)> = match &job.source {
            SourceSpec::File { path, tables } => vec![(path.clone(), tables.clone())],
            SourceSpec::Folder { dir } => list_source_files(dir)?
                .into_iter()
                .filter_map(|path| match table_name_for_path(&path) {
                    Some(table) => Some((path, vec![table])),
                    None => {
                        warn!(path = %path.display(), "Cannot derive a table name; skipping");
                        None
                    }
                })
                .collect(),
        };

        if plan.is_empty() {
            return Err(EngineError::config("nothing to load: no source files or tables"));
        }
        if job.dry_run {
            self.events.log("Dry run: nothing will be written");
        }

        let mut tally = LoadTally::default();

        for (path, tables) in &plan {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled_load(&tally));
            }

            let source = match read_source(path, &job.options) {
                Ok(source) => source,
                Err(e) => {
                    self.events.error(e.to_string());
                    tally.failed += tables.len();
                    continue;
                }
            };
            self.report_source(&source);

            for table in tables {
                if self.cancel.is_cancelled() {
                    return Ok(self.cancelled_load(&tally));
                }

                match self.load_table(store, table, &source, &job).await {
                    Ok(TableResult::Loaded(rows)) => {
                        tally.loaded += 1;
                        tally.rows += rows;
                    }
                    Ok(TableResult::Empty) => tally.skipped += 1,
                    Ok(TableResult::Cancelled(rows)) => {
                        tally.rows += rows;
                        return Ok(self.cancelled_load(&tally));
                    }
                    Err(e) if e.is_table_scoped() => {
                        self.events.error(e.to_string());
                        tally.failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let message = format!("{} ({} rows)", tally.summary(), tally.rows);
        if tally.failed == 0 {
            Ok(RunOutcome::Succeeded { message })
        } else {
            Ok(RunOutcome::Failed { message })
        }
    }

    fn cancelled_load(&self, tally: &LoadTally) -> RunOutcome {
        RunOutcome::Cancelled {
            message: format!(
                "Load cancelled; committed work is kept ({}, {} rows)",
                tally.summary(),
                tally.rows
            ),
        }
    }

    fn report_source(&self, source: &SourceFile) {
        self.events.log(format!(
            "Read {}: {} rows, encoding {}, delimiter '{}'",
            source.path.display(),
            source.table.len(),
            source.encoding,
            delimiter_name(source.delimiter)
        ));
        if !source.skipped_lines.is_empty() {
            self.events.log(format!(
                "Skipped {} malformed lines in {}",
                source.skipped_lines.len(),
                source.path.display()
            ));
        }
    }

    async fn load_table(
        &self,
        store: &mut C::Store,
        table: &str,
        source: &SourceFile,
        job: &LoadJob,
    ) -> Result<TableResult> {
        let schema = self
            .registry
            .table(table)
            .ok_or_else(|| EngineError::UnknownTable(table.to_string()))?;

        self.events.log(format!("Processing table {}", table));
        let report = CoercionPipeline::new(table, schema).run(&source.table)?;
        if report.nulled_cells > 0 {
            self.events.log(format!(
                "{}: {} values could not be converted and were set to null",
                table, report.nulled_cells
            ));
        }

        let dataset = report.dataset;
        if dataset.is_empty() {
            self.events
                .log(format!("{}: no valid rows after filtering; skipped", table));
            return Ok(TableResult::Empty);
        }

        if job.dry_run {
            self.events.log(format!(
                "Dry run: {} rows would be loaded into {}",
                dataset.len(),
                table
            ));
            return Ok(TableResult::Loaded(0));
        }

        let outcome = match job.strategy {
            LoadStrategy::Chunked => {
                ChunkedLoader::new(self.settings.chunk_size)
                    .load(store, table, &dataset, &self.cancel, &self.events)
                    .await?
            }
            LoadStrategy::Bulk => {
                BulkCopyLoader::new()
                    .load(store, table, &dataset, &self.cancel)
                    .await?
            }
        };

        match outcome {
            LoadOutcome::Completed { rows, .. } => {
                self.events
                    .log(format!("{}: {} rows loaded ({})", table, rows, job.strategy));
                Ok(TableResult::Loaded(rows))
            }
            LoadOutcome::Cancelled {
                rows_committed,
                chunks_committed,
            } => {
                self.events.log(format!(
                    "{}: stopped after {} chunks, {} rows remain committed",
                    table, chunks_committed, rows_committed
                ));
                Ok(TableResult::Cancelled(rows_committed))
            }
        }
    }
}
