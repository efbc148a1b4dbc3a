//! Connection manager
//!
//! Holds the caller's single [`ConnectionConfig`] and the caller's own session.
//! Background runs never borrow that session: they take a config snapshot and
//! open their own through [`open_session`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::error::{EngineError, Result};
use crate::store::{Connector, Store};

/// Open a session and pin it to the configured namespace.
///
/// A session whose namespace cannot be set is closed and reported as a
/// connection failure; it never silently stays on the default schema.
pub async fn open_session<C>(connector: &C, config: &ConnectionConfig) -> Result<C::Store>
where
    C: Connector + ?Sized,
{
    config.validate()?;

    let mut store = connector
        .open(config)
        .await
        .map_err(EngineError::Connection)?;

    if let Err(e) = store.set_namespace(&config.namespace).await {
        store.close().await.ok();
        return Err(EngineError::Connection(e));
    }

    info!(target_db = %config.describe(), "Connected");
    Ok(store)
}

/// Owns the caller-side config and session
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: Option<Arc<ConnectionConfig>>,
    session: Option<C::Store>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            config: None,
            session: None,
        }
    }

    /// Apply `config` and open a session with it.
    ///
    /// An invalid config is rejected before anything changes. Once the config
    /// is accepted it replaces the old one even if connecting then fails, in
    /// which case the manager is left without a live session.
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<()> {
        config.validate()?;
        self.close().await;
        self.config = Some(Arc::new(config));
        self.reconnect().await
    }

    /// Replace the config and reconnect. Same semantics as [`connect`](Self::connect).
    pub async fn update_config(&mut self, config: ConnectionConfig) -> Result<()> {
        self.connect(config).await
    }

    /// Drop any current session and open a new one with the current config
    pub async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        let config = self.config.clone().ok_or(EngineError::NotConnected)?;
        let session = open_session(self.connector.as_ref(), &config).await?;
        self.session = Some(session);
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// The caller's own session
    pub fn session(&mut self) -> Result<&mut C::Store> {
        self.session.as_mut().ok_or(EngineError::NotConnected)
    }

    /// Immutable snapshot of the current config for a background run
    pub fn config_snapshot(&self) -> Option<Arc<ConnectionConfig>> {
        self.config.clone()
    }

    pub fn connector(&self) -> Arc<C> {
        Arc::clone(&self.connector)
    }

    /// Open a session that is independent of the caller's one
    pub async fn open_independent(&self) -> Result<C::Store> {
        let config = self.config.as_ref().ok_or(EngineError::NotConnected)?;
        open_session(self.connector.as_ref(), config).await
    }

    /// Close the caller's session. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Error while closing session");
            }
        }
    }
}
