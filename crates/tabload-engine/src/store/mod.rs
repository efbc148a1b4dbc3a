//! Destination store abstraction
//!
//! A [`Connector`] opens independent sessions from a [`ConnectionConfig`]; a
//! [`Store`] is one such session. Sessions are owned by exactly one task and
//! never shared, which is why the trait takes `&mut self` everywhere.
//!
//! Transaction boundaries live inside the store: `insert_chunk` and `copy_in`
//! each run in their own transaction and either commit everything they were
//! given or roll it all back.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectionConfig;
use crate::dataset::Row;

pub mod postgres;

pub use postgres::{PgConnector, PgStore, SessionDiagnostics};

/// Failures reported by a store session
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("schema '{0}' does not exist")]
    NamespaceMissing(String),

    #[error("relation {0} is not visible to this session")]
    NotVisible(String),

    /// The store refused the operation (used by non-SQL stores and timeouts)
    #[error("{0}")]
    Rejected(String),

    #[error("the session is closed")]
    Closed,
}

/// One live session against the destination store
#[async_trait]
pub trait Store: Send {
    /// Schema the session is currently pinned to
    fn namespace(&self) -> &str;

    /// Pin the session to `namespace`. Fails if the schema does not exist.
    async fn set_namespace(&mut self, namespace: &str) -> Result<(), StoreError>;

    /// Whether `table` resolves under the current namespace
    async fn table_visible(&mut self, table: &str) -> Result<bool, StoreError>;

    /// Insert `rows` in one transaction. Returns the number of rows written.
    async fn insert_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, StoreError>;

    /// Bulk-transfer a tab-separated payload in one transaction
    async fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        payload: Vec<u8>,
    ) -> Result<u64, StoreError>;

    /// Run one statement with autocommit. Returns affected rows.
    async fn execute(&mut self, statement: &str) -> Result<u64, StoreError>;

    /// Close the session. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Opens store sessions
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Store: Store + 'static;

    /// Open a fresh, un-pinned session
    async fn open(&self, config: &ConnectionConfig) -> Result<Self::Store, StoreError>;
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"namespace"."table"`
pub fn qualified_name(namespace: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(namespace), quote_ident(table))
}

/// Comma-separated list of quoted column names
pub fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
