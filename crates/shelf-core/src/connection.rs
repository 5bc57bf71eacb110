//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the single open handle to a named database. Every
//! open closes whatever handle is held and requests a fresh connection one
//! version above the last one it saw, so each open runs a version change and
//! schema upgrades can piggyback on any call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::engine::{Database, Engine, ReadyState, UpgradeFn, VersionChange};
use crate::error::{Result, ShelfError};
use crate::logging::prefix;

/// Opens tried before giving up on a database whose version keeps moving
const MAX_OPEN_ATTEMPTS: usize = 3;

/// Owner of the connection handle for one database.
///
/// The handle is either `None` (closed) or exactly one live engine connection.
pub struct ConnectionManager<E: Engine> {
    engine: E,
    name: String,
    handle: Option<E::Database>,
    version: Option<u64>,
}

impl<E: Engine> ConnectionManager<E> {
    /// Manage `name` on `engine`. `version` is the database's known current
    /// version; `None` asks the engine on first open.
    pub fn new(engine: E, name: impl Into<String>, version: Option<u64>) -> Self {
        Self {
            engine,
            name: name.into(),
            handle: None,
            version,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last version this manager opened (or was told about).
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// The held connection, if any.
    pub fn handle(&self) -> Option<&E::Database> {
        self.handle.as_ref()
    }

    /// Capability check. Logs a diagnostic when the engine is absent.
    pub fn is_supported(&self) -> bool {
        if self.engine.is_available() {
            true
        } else {
            error!(
                "{} storage engine is not available in this environment",
                prefix::DB
            );
            false
        }
    }

    fn ensure_supported(&self) -> Result<()> {
        if self.engine.is_available() {
            Ok(())
        } else {
            Err(ShelfError::Unsupported(format!(
                "no storage engine for database '{}'",
                self.name
            )))
        }
    }

    /// The held connection, or `InvalidStateError` when closed.
    pub(crate) fn current(&self) -> Result<&E::Database> {
        self.handle.as_ref().ok_or_else(|| {
            ShelfError::engine(
                "InvalidStateError",
                format!("no open connection to '{}'", self.name),
            )
        })
    }

    async fn next_version(&mut self) -> Result<u64> {
        let current = match self.version {
            Some(version) => version,
            None => {
                let current = self.engine.open(&self.name, None, None).await?;
                let version = current.version();
                current.close();
                debug!("{} '{}' is at v{}", prefix::DB, self.name, version);
                version
            }
        };
        Ok(current + 1)
    }

    /// Replace the held connection with a fresh one at the next version,
    /// running `upgrade` inside the version change.
    ///
    /// Another instance may already have moved the database to exactly the
    /// version asked for, in which case the engine opens without a version
    /// change and `upgrade` never runs. That connection is dropped and the open
    /// is retried one version above a freshly read version.
    pub(crate) async fn reopen(&mut self, upgrade: Option<UpgradeFn>) -> Result<()> {
        self.ensure_supported()?;
        self.close();
        let pending = Rc::new(RefCell::new(upgrade));
        for _ in 0..MAX_OPEN_ATTEMPTS {
            let version = self.next_version().await?;
            let changed = Rc::new(Cell::new(false));
            let hook: UpgradeFn = {
                let pending = pending.clone();
                let changed = changed.clone();
                Box::new(move |vc: &mut dyn VersionChange| {
                    changed.set(true);
                    let upgrade = pending.borrow_mut().take();
                    match upgrade {
                        Some(upgrade) => upgrade(vc),
                        None => Ok(()),
                    }
                })
            };
            match self.engine.open(&self.name, Some(version), Some(hook)).await {
                Ok(db) if changed.get() => {
                    debug!("{} opened '{}' v{}", prefix::OPEN, self.name, db.version());
                    self.version = Some(db.version());
                    self.handle = Some(db);
                    return Ok(());
                }
                Ok(db) => {
                    db.close();
                    warn!(
                        "{} '{}' was already at v{}, reading its version again",
                        prefix::DB,
                        self.name,
                        version
                    );
                    self.version = None;
                }
                Err(err) => {
                    // Someone else moved the version; ask the engine again next time
                    if err.engine_name() == Some("VersionError") {
                        self.version = None;
                    }
                    return Err(err);
                }
            }
        }
        Err(ShelfError::engine(
            "VersionError",
            format!(
                "no version change for '{}' after {} attempts",
                self.name, MAX_OPEN_ATTEMPTS
            ),
        ))
    }

    /// Open a fresh connection, optionally requiring `store` to exist.
    ///
    /// A missing required store closes the new connection again and fails with
    /// [`ShelfError::StoreNotFound`]; callers recover by adding the store first.
    pub async fn open(&mut self, required_store: Option<&str>) -> Result<&E::Database> {
        self.reopen(None).await?;
        if let Some(store) = required_store {
            if !self.current()?.contains_store(store) {
                warn!(
                    "{} object store '{}' does not exist in '{}'",
                    prefix::DB,
                    store,
                    self.name
                );
                self.close();
                return Err(ShelfError::StoreNotFound(store.to_string()));
            }
        }
        self.current()
    }

    /// Close the held connection. No-op when nothing is open.
    pub fn close(&mut self) {
        if let Some(db) = self.handle.take() {
            db.close();
            debug!("{} closed '{}'", prefix::CLOSE, self.name);
        }
    }

    /// Close, then destroy the whole database.
    pub async fn delete_database(&mut self) -> Result<ReadyState> {
        self.ensure_supported()?;
        self.close();
        self.version = None;
        let state = self.engine.delete_database(&self.name).await?;
        info!("{} deleted database '{}'", prefix::DB, self.name);
        Ok(state)
    }

    /// Open a fresh connection and report whether `store` exists.
    ///
    /// The connection stays open.
    pub async fn has_store(&mut self, store: &str) -> Result<bool> {
        Ok(self.open(None).await?.contains_store(store))
    }
}

impl<E: Engine> Drop for ConnectionManager<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: Engine> std::fmt::Debug for ConnectionManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("open", &self.handle.is_some())
            .finish()
    }
}
