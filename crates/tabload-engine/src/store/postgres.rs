//! PostgreSQL store on a single `sqlx::PgConnection`
//!
//! Each worker opens its own `PgStore`; there is no pool because a session is
//! never shared between tasks.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::query_builder::Separated;
use sqlx::{Connection, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{column_list, qualified_name, quote_ident, Connector, Store, StoreError};
use crate::config::ConnectionConfig;
use crate::dataset::{CellValue, Row};

/// Upper bound on bind parameters in one PostgreSQL statement
const PG_BIND_LIMIT: usize = 65_535;

/// Opens [`PgStore`] sessions
#[derive(Debug, Clone)]
pub struct PgConnector {
    connect_timeout: Duration,
}

impl Default for PgConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Store = PgStore;

    async fn open(&self, config: &ConnectionConfig) -> Result<PgStore, StoreError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .application_name("tabload");

        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                StoreError::Rejected(format!(
                    "timed out after {}s connecting to {}:{}",
                    self.connect_timeout.as_secs(),
                    config.host,
                    config.port
                ))
            })??;

        debug!(host = %config.host, port = config.port, "PostgreSQL session opened");
        Ok(PgStore::new(conn))
    }
}

/// What `tabload check` reports about a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub server_version: String,
    pub search_path: String,
    pub namespace_exists: bool,
}

/// One PostgreSQL session
pub struct PgStore {
    conn: Option<PgConnection>,
    namespace: String,
    /// table -> column -> declared type, filled once per table
    column_types: HashMap<String, HashMap<String, String>>,
}

impl PgStore {
    fn new(conn: PgConnection) -> Self {
        Self {
            conn: Some(conn),
            namespace: "public".to_string(),
            column_types: HashMap::new(),
        }
    }

    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }

    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1)")
                .bind(namespace)
                .fetch_one(&mut *conn)
                .await?;
        Ok(exists)
    }

    /// Server version, effective search_path and whether `namespace` exists
    pub async fn diagnose(&mut self, namespace: &str) -> Result<SessionDiagnostics, StoreError> {
        let namespace_exists = self.namespace_exists(namespace).await?;
        let conn = self.conn()?;
        let server_version: String = sqlx::query_scalar("SHOW server_version")
            .fetch_one(&mut *conn)
            .await?;
        let search_path: String = sqlx::query_scalar("SHOW search_path")
            .fetch_one(&mut *conn)
            .await?;

        Ok(SessionDiagnostics {
            server_version,
            search_path,
            namespace_exists,
        })
    }

    /// Declared type to cast each placeholder to, per column.
    ///
    /// Text-like columns get no cast so that over-long values fail instead of
    /// being truncated by an explicit `varchar(n)` cast.
    async fn placeholder_casts(
        &mut self,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let qualified = qualified_name(&self.namespace, table);
        if !self.column_types.contains_key(table) {
            let conn = self.conn()?;
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
                 FROM pg_attribute a \
                 WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped",
            )
            .bind(&qualified)
            .fetch_all(&mut *conn)
            .await?;

            if rows.is_empty() {
                return Err(StoreError::NotVisible(qualified));
            }
            self.column_types
                .insert(table.to_string(), rows.into_iter().collect());
        }

        let types = self
            .column_types
            .get(table)
            .ok_or_else(|| StoreError::NotVisible(qualified.clone()))?;

        Ok(columns
            .iter()
            .map(|column| {
                types
                    .get(column)
                    .filter(|ty| !is_text_type(ty))
                    .cloned()
            })
            .collect())
    }
}

fn is_text_type(ty: &str) -> bool {
    ty == "text" || ty.starts_with("character") || ty.starts_with("varchar")
}

fn push_cell(b: &mut Separated<'_, '_, Postgres, &'static str>, value: &CellValue) {
    match value {
        CellValue::Null => b.push_bind(None::<String>),
        CellValue::Text(s) => b.push_bind(s.clone()),
        CellValue::Integer(v) => b.push_bind(*v),
        CellValue::Decimal(v) => b.push_bind(*v),
        CellValue::Date(d) => b.push_bind(*d),
        CellValue::Time(t) => b.push_bind(*t),
        CellValue::Timestamp(ts) => b.push_bind(*ts),
    };
}

#[async_trait]
impl Store for PgStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn set_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        // SET search_path accepts schemas that do not exist, so check first
        if !self.namespace_exists(namespace).await? {
            return Err(StoreError::NamespaceMissing(namespace.to_string()));
        }

        let statement = format!("SET search_path TO {}", quote_ident(namespace));
        let conn = self.conn()?;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&statement)).await?;

        self.namespace = namespace.to_string();
        self.column_types.clear();
        info!(namespace, "search_path set");
        Ok(())
    }

    async fn table_visible(&mut self, table: &str) -> Result<bool, StoreError> {
        let qualified = qualified_name(&self.namespace, table);
        let conn = self.conn()?;
        let visible: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&qualified)
            .fetch_one(&mut *conn)
            .await?;
        Ok(visible)
    }

    async fn insert_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let casts = self.placeholder_casts(table, columns).await?;
        let insert_head = format!(
            "INSERT INTO {} ({}) ",
            qualified_name(&self.namespace, table),
            column_list(columns)
        );
        let rows_per_statement = (PG_BIND_LIMIT / columns.len().max(1)).max(1);

        let conn = self.conn()?;
        let mut tx = conn.begin().await?;
        let mut written = 0u64;

        for part in rows.chunks(rows_per_statement) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert_head);
            query_builder.push_values(part.iter(), |mut b, row| {
                for (value, cast) in row.iter().zip(casts.iter()) {
                    push_cell(&mut b, value);
                    if let Some(ty) = cast {
                        b.push_unseparated(format!("::{}", ty));
                    }
                }
            });

            match query_builder.build().execute(&mut *tx).await {
                Ok(result) => written += result.rows_affected(),
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        debug!(table, rows = written, "Chunk committed");
        Ok(written)
    }

    async fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        payload: Vec<u8>,
    ) -> Result<u64, StoreError> {
        let statement = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text, NULL '')",
            qualified_name(&self.namespace, table),
            column_list(columns)
        );

        let conn = self.conn()?;
        let mut tx = conn.begin().await?;

        let mut copy = tx.copy_in_raw(&statement).await?;
        if let Err(e) = copy.send(payload).await {
            copy.abort(e.to_string()).await.ok();
            tx.rollback().await.ok();
            return Err(e.into());
        }
        let rows = match copy.finish().await {
            Ok(rows) => rows,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e.into());
            }
        };

        tx.commit().await?;
        debug!(table, rows, "COPY committed");
        Ok(rows)
    }

    async fn execute(&mut self, statement: &str) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(statement)).await?;
        Ok(result.rows_affected())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!("PostgreSQL session closed");
        }
        Ok(())
    }
}
