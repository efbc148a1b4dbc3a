//! Connection and engine configuration
//!
//! Both structs load from the environment (after `.env`, via `dotenvy`) and can
//! be overridden field by field by the CLI. A [`ConnectionConfig`] is treated as
//! immutable once a run starts: workers receive an `Arc` snapshot of it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};
use crate::executor::Splitter;

/// Connection parameters for the destination store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Schema every session is pinned to at connect time
    pub namespace: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            namespace: "public".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ConnectionConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASS` and `DB_SCHEMA`.
    ///
    /// Missing variables fall back to the defaults; a `DB_PORT` that is not a
    /// valid port number is an error rather than a silent default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let port = match std::env::var("DB_PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| EngineError::config(format!("DB_PORT '{}' is not a port number", raw)))?,
            Err(_) => defaults.port,
        };

        let config = Self {
            host: std::env::var("DB_HOST").unwrap_or(defaults.host),
            port,
            database: std::env::var("DB_NAME").unwrap_or(defaults.database),
            user: std::env::var("DB_USER").unwrap_or(defaults.user),
            password: std::env::var("DB_PASS").unwrap_or(defaults.password),
            namespace: std::env::var("DB_SCHEMA").unwrap_or(defaults.namespace),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(EngineError::config("database host is empty"));
        }
        if self.port == 0 {
            return Err(EngineError::config("database port must be non-zero"));
        }
        if self.database.trim().is_empty() {
            return Err(EngineError::config("database name is empty"));
        }
        if self.user.trim().is_empty() {
            return Err(EngineError::config("database user is empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(EngineError::config(
                "schema is empty. Set DB_SCHEMA or pass --schema.",
            ));
        }
        Ok(())
    }

    /// `user@host:port/database` with the schema, for log lines
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} (schema {})",
            self.user, self.host, self.port, self.database, self.namespace
        )
    }
}

/// Tuning knobs for loads and script runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Rows per committed chunk in the chunked loader
    pub chunk_size: usize,
    /// How often the consumer loop drains the progress channel
    pub poll_interval_ms: u64,
    pub statement_terminator: char,
    pub splitter: Splitter,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            poll_interval_ms: 100,
            statement_terminator: ';',
            splitter: Splitter::Naive,
        }
    }
}

impl EngineSettings {
    /// Read `TABLOAD_CHUNK_SIZE` and `TABLOAD_POLL_INTERVAL_MS`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let chunk_size = std::env::var("TABLOAD_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.chunk_size);

        let poll_interval_ms = std::env::var("TABLOAD_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.poll_interval_ms);

        let settings = Self {
            chunk_size,
            poll_interval_ms,
            ..defaults
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::config("chunk size must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::config("poll interval must be at least 1 ms"));
        }
        if self.statement_terminator.is_whitespace() {
            return Err(EngineError::config("statement terminator cannot be whitespace"));
        }
        Ok(())
    }
}
