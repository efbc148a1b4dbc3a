//! Common test utilities for tabload engine integration tests
//!
//! Most tests run against [`MemoryDatabase`], an in-process stand-in for the
//! destination store that implements the same `Connector`/`Store` seam as the
//! PostgreSQL store. It records every transaction boundary in a journal and
//! can be told to fail specific chunks, statements or copies.
//!
//! [`TestPostgres`] starts a real PostgreSQL container for the `#[ignore]`d
//! tests that need one.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::MemoryDatabase;
//!
//! #[tokio::test]
//! async fn test_with_memory_store() {
//!     let db = MemoryDatabase::new();
//!     db.create_table("migracao", "tab01", &["a", "b"]);
//!     let connector = db.connector();
//!     // open sessions through `connector` like any other Connector
//! }
//! ```
#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tabload_engine::{
    CancellationToken, CellValue, ConnectionConfig, Connector, ProgressEvent, Row,
    SchemaRegistry, Store, StoreError,
};
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Schema used by most tests
pub const TEST_SCHEMA: &str = "migracao";

// ============================================================================
// In-memory store
// ============================================================================

/// One transaction-relevant event seen by the memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Begin { conn: usize, table: String },
    Commit { conn: usize, table: String, rows: usize },
    Rollback { conn: usize, table: String },
    Copy { conn: usize, table: String, rows: usize },
    Execute { conn: usize, statement: String },
}

impl JournalEntry {
    pub fn conn(&self) -> usize {
        match self {
            JournalEntry::Begin { conn, .. }
            | JournalEntry::Commit { conn, .. }
            | JournalEntry::Rollback { conn, .. }
            | JournalEntry::Copy { conn, .. }
            | JournalEntry::Execute { conn, .. } => *conn,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct DbState {
    password: String,
    schemas: BTreeMap<String, BTreeMap<String, MemTable>>,
    journal: Vec<JournalEntry>,
    chunk_calls: HashMap<String, usize>,
    fail_chunks: HashSet<(String, usize)>,
    fail_statements: Vec<String>,
    fail_copies: HashSet<String>,
    cancel_after_commits: Option<(usize, CancellationToken)>,
    commits: usize,
    copy_calls: usize,
    connections_opened: usize,
    executed: Vec<String>,
}

impl DbState {
    fn table_mut(&mut self, schema: &str, table: &str) -> Option<&mut MemTable> {
        self.schemas.get_mut(schema)?.get_mut(table)
    }
}

/// Shared in-memory database
pub struct MemoryDatabase {
    state: Mutex<DbState>,
}

impl MemoryDatabase {
    /// Database with `public` and [`TEST_SCHEMA`] schemas and an empty password
    pub fn new() -> Arc<Self> {
        let mut state = DbState::default();
        state.schemas.insert("public".to_string(), BTreeMap::new());
        state.schemas.insert(TEST_SCHEMA.to_string(), BTreeMap::new());
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap()
    }

    pub fn connector(self: &Arc<Self>) -> MemoryConnector {
        MemoryConnector {
            db: Arc::clone(self),
        }
    }

    pub fn set_password(&self, password: &str) {
        self.lock().password = password.to_string();
    }

    pub fn create_table(&self, schema: &str, table: &str, columns: &[&str]) {
        let mut state = self.lock();
        state.schemas.entry(schema.to_string()).or_default().insert(
            table.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Make the `nth` (1-based) insert into `table` fail and roll back
    pub fn fail_chunk(&self, table: &str, nth: usize) {
        self.lock().fail_chunks.insert((table.to_string(), nth));
    }

    pub fn fail_statement(&self, statement: &str) {
        self.lock().fail_statements.push(statement.to_string());
    }

    pub fn fail_copy(&self, table: &str) {
        self.lock().fail_copies.insert(table.to_string());
    }

    /// Cancel `token` right after the `count`-th chunk commit
    pub fn cancel_after_commits(&self, count: usize, token: CancellationToken) {
        self.lock().cancel_after_commits = Some((count, token));
    }

    pub fn rows(&self, schema: &str, table: &str) -> Vec<Row> {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn copy_calls(&self) -> usize {
        self.lock().copy_calls
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.lock().connections_opened
    }
}

/// Opens [`MemoryStore`] sessions
#[derive(Clone)]
pub struct MemoryConnector {
    db: Arc<MemoryDatabase>,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Store = MemoryStore;

    async fn open(&self, config: &ConnectionConfig) -> Result<MemoryStore, StoreError> {
        let mut state = self.db.lock();
        if config.password != state.password {
            return Err(StoreError::Rejected(format!(
                "password authentication failed for user \"{}\"",
                config.user
            )));
        }
        state.connections_opened += 1;
        Ok(MemoryStore {
            db: Arc::clone(&self.db),
            conn: state.connections_opened,
            namespace: "public".to_string(),
            closed: false,
        })
    }
}

/// One session against a [`MemoryDatabase`]
pub struct MemoryStore {
    db: Arc<MemoryDatabase>,
    conn: usize,
    namespace: String,
    closed: bool,
}

impl MemoryStore {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.namespace, table)
    }
}

fn decode_copy_field(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Null;
    }
    let mut out = String::new();
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    CellValue::Text(out)
}

#[async_trait]
impl Store for MemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn set_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        self.check_open()?;
        if !self.db.lock().schemas.contains_key(namespace) {
            return Err(StoreError::NamespaceMissing(namespace.to_string()));
        }
        self.namespace = namespace.to_string();
        Ok(())
    }

    async fn table_visible(&mut self, table: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut state = self.db.lock();
        Ok(state.table_mut(&self.namespace, table).is_some())
    }

    async fn insert_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, StoreError> {
        self.check_open()?;
        {
            let mut state = self.db.lock();
            let Some(target) = state.table_mut(&self.namespace, table) else {
                return Err(StoreError::NotVisible(self.qualified(table)));
            };
            if target.columns != columns {
                return Err(StoreError::Rejected(format!(
                    "column list does not match {}",
                    table
                )));
            }

            state.journal.push(JournalEntry::Begin {
                conn: self.conn,
                table: table.to_string(),
            });
            let calls = state.chunk_calls.entry(table.to_string()).or_default();
            *calls += 1;
            let nth = *calls;
            if state.fail_chunks.contains(&(table.to_string(), nth)) {
                state.journal.push(JournalEntry::Rollback {
                    conn: self.conn,
                    table: table.to_string(),
                });
                return Err(StoreError::Rejected(format!(
                    "duplicate key value violates unique constraint (chunk {})",
                    nth
                )));
            }
        }

        // Lets other sessions run while this transaction is open
        tokio::task::yield_now().await;

        let mut state = self.db.lock();
        if let Some(target) = state.table_mut(&self.namespace, table) {
            target.rows.extend(rows.iter().cloned());
        }
        state.journal.push(JournalEntry::Commit {
            conn: self.conn,
            table: table.to_string(),
            rows: rows.len(),
        });
        state.commits += 1;
        if let Some((count, token)) = &state.cancel_after_commits {
            if state.commits == *count {
                token.cancel();
            }
        }
        Ok(rows.len() as u64)
    }

    async fn copy_in(
        &mut self,
        table: &str,
        _columns: &[String],
        payload: Vec<u8>,
    ) -> Result<u64, StoreError> {
        self.check_open()?;
        let mut state = self.db.lock();
        state.copy_calls += 1;
        if state.fail_copies.contains(table) {
            return Err(StoreError::Rejected(format!(
                "invalid input syntax in COPY {}",
                table
            )));
        }

        let text = String::from_utf8_lossy(&payload).into_owned();
        let rows: Vec<Row> = text
            .lines()
            .map(|line| line.split('\t').map(decode_copy_field).collect())
            .collect();
        let count = rows.len();

        let conn = self.conn;
        let qualified = self.qualified(table);
        let target = state
            .table_mut(&self.namespace, table)
            .ok_or(StoreError::NotVisible(qualified))?;
        target.rows.extend(rows);
        state.journal.push(JournalEntry::Copy {
            conn,
            table: table.to_string(),
            rows: count,
        });
        Ok(count as u64)
    }

    async fn execute(&mut self, statement: &str) -> Result<u64, StoreError> {
        self.check_open()?;
        let mut state = self.db.lock();
        if state.fail_statements.iter().any(|s| s == statement) {
            return Err(StoreError::Rejected(format!(
                "syntax error at or near \"{}\"",
                statement
            )));
        }
        state.journal.push(JournalEntry::Execute {
            conn: self.conn,
            statement: statement.to_string(),
        });
        state.executed.push(statement.to_string());
        Ok(0)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Config pointing at [`TEST_SCHEMA`] with the default (empty) password
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        namespace: TEST_SCHEMA.to_string(),
        ..Default::default()
    }
}

pub const REGISTRY_YAML: &str = r#"
tables:
  tab01:
    columns: [mesref, tipo_dia, fx_hora, viagens, tempo_percurso, disp_frota]
    rules:
      viagens: integer
      disp_frota: integer
  tab02:
    columns: [data_completa, linha, valor, bloqueio_id]
    rules:
      data_completa: date
      valor: decimal
      bloqueio_id: integer
  tab03:
    columns: [dia, linha, hora1, hora2]
    rules:
      dia: date
      hora1: time
      hora2: time
scripts:
  - name: cleanup
    sql: "DELETE FROM tab01 WHERE viagens IS NULL"
  - name: stats
    sql: "ANALYZE tab01"
"#;

pub fn test_registry() -> SchemaRegistry {
    SchemaRegistry::from_yaml_str(REGISTRY_YAML).unwrap()
}

/// Create every registry table in [`TEST_SCHEMA`]
pub fn create_registry_tables(db: &MemoryDatabase, registry: &SchemaRegistry) {
    for (name, schema) in registry.tables() {
        let columns: Vec<&str> = schema.columns.iter().map(String::as_str).collect();
        db.create_table(TEST_SCHEMA, name, &columns);
    }
}

pub fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// `rows` lines of tab01 data, `;`-separated, with a header
pub fn tab01_csv(rows: usize, marker: &str) -> String {
    let mut csv = String::from("MesRef;Tipo Dia;Faixa;Viagens;Tempo;Frota\n");
    for i in 0..rows {
        csv.push_str(&format!("{marker};util;{:02};{};{},5;{}\n", i % 24, i, i, i % 7));
    }
    csv
}

pub fn progress_percents(events: &[ProgressEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

pub fn error_messages(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn terminal_events(events: &[ProgressEvent]) -> Vec<ProgressEvent> {
    events.iter().filter(|e| e.is_terminal()).cloned().collect()
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container for tests that need the real store
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    config: ConnectionConfig,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let config = ConnectionConfig {
            host: host.to_string(),
            port,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            namespace: "public".to_string(),
        };

        Ok(Self { container, config })
    }

    /// Config for the container, pinned to `namespace`
    pub fn config(&self, namespace: &str) -> ConnectionConfig {
        ConnectionConfig {
            namespace: namespace.to_string(),
            ..self.config.clone()
        }
    }
}
