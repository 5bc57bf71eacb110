//! The `Shelf` façade
//!
//! One instance manages one database. Each public operation opens (or reuses) a
//! connection, optionally upgrades the schema, runs at most one data
//! transaction and closes the connection again. Schema operations live in
//! [`schema`](crate::schema), record operations in [`records`](crate::records).

use crate::config::ShelfConfig;
use crate::connection::ConnectionManager;
use crate::engine::{Engine, ReadyState};
use crate::error::Result;

/// Sequencing layer over one database of an [`Engine`].
///
/// Methods take `&mut self`: an instance holds a single connection, so
/// overlapping calls on one instance are ruled out at compile time.
#[derive(Debug)]
pub struct Shelf<E: Engine> {
    pub(crate) connection: ConnectionManager<E>,
    pub(crate) config: ShelfConfig,
}

impl<E: Engine> Shelf<E> {
    /// Manage database `name` with default settings.
    pub fn new(engine: E, name: impl Into<String>) -> Self {
        Self::with_config(engine, ShelfConfig::new(name))
    }

    pub fn with_config(engine: E, config: ShelfConfig) -> Self {
        Self {
            connection: ConnectionManager::new(
                engine,
                config.database.clone(),
                config.initial_version,
            ),
            config,
        }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        self.connection.engine()
    }

    pub fn connection(&self) -> &ConnectionManager<E> {
        &self.connection
    }

    /// Whether the host provides the storage engine.
    ///
    /// Callers should check this before any other operation; absence is
    /// logged, not raised.
    pub fn is_supported(&self) -> bool {
        self.connection.is_supported()
    }

    /// Open a fresh connection, failing with `StoreNotFound` if
    /// `required_store` is given and absent.
    pub async fn open(&mut self, required_store: Option<&str>) -> Result<&E::Database> {
        self.connection.open(required_store).await
    }

    pub fn close(&mut self) {
        self.connection.close();
    }

    /// Destroy the database.
    pub async fn del_db(&mut self) -> Result<ReadyState> {
        self.connection.delete_database().await
    }

    /// Whether `store` exists. Leaves the connection it opened open.
    pub async fn has_store(&mut self, store: &str) -> Result<bool> {
        self.connection.has_store(store).await
    }

    /// Connection for a record operation on `store`.
    pub(crate) async fn open_for(&mut self, store: &str) -> Result<&E::Database> {
        let required = self.config.validate_stores.then_some(store);
        self.connection.open(required).await
    }
}
