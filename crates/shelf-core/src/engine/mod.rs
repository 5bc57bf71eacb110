//! Storage engine abstraction
//!
//! The control layer never stores anything itself. It sequences calls into an
//! engine that provides versioned databases, transactional object stores with an
//! optional in-line key field, secondary indexes and forward cursors. The traits
//! here describe that collaborator. Implementations exist for:
//!
//! - **Memory**: in-process reference engine for tests and native callers (`MemoryEngine`)
//! - **IndexedDB**: browser engine via web-sys (separate crate, WASM only)
//!
//! Every asynchronous method resolves exactly once, either with the engine's
//! success result or with its error. Futures are not `Send`: engines are
//! single-threaded and completion-driven.

mod memory;

use serde_json::Value;

use crate::error::Result;
use crate::key::Key;
use crate::range::{KeyQuery, KeyRange};

pub use memory::{
    MemoryCursor, MemoryDatabase, MemoryEngine, MemoryIndex, MemoryObjectStore, MemoryTransaction,
};

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Completion marker returned by destructive engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Pending,
    Done,
}

impl ReadyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Pending => "pending",
            ReadyState::Done => "done",
        }
    }
}

/// Schema mutation hook run inside a version-change transaction.
///
/// Returning an error aborts the upgrade; the database keeps its previous
/// version and structure.
pub type UpgradeFn = Box<dyn FnOnce(&mut dyn VersionChange) -> Result<()>>;

/// Structural access to a database during a version change.
///
/// This is the only context in which stores and indexes may be created or dropped.
pub trait VersionChange {
    /// Version before this change; 0 when the database is being created.
    fn old_version(&self) -> u64;

    fn new_version(&self) -> u64;

    fn store_names(&self) -> Vec<String>;

    fn contains_store(&self, name: &str) -> bool {
        self.store_names().iter().any(|s| s == name)
    }

    /// Create a store, with `key_path` as its in-line key field when given.
    ///
    /// Fails with `ConstraintError` if the store already exists.
    fn create_store(&mut self, name: &str, key_path: Option<&str>) -> Result<()>;

    /// Drop a store and all its records and indexes.
    ///
    /// Fails with `NotFoundError` if the store does not exist.
    fn delete_store(&mut self, name: &str) -> Result<()>;

    /// Create a secondary index named `name` over `field` of `store`.
    fn create_index(&mut self, store: &str, name: &str, field: &str, unique: bool) -> Result<()>;
}

/// Database factory of the host environment.
#[allow(async_fn_in_trait)]
pub trait Engine {
    type Database: Database;

    /// Whether the host actually provides this engine.
    fn is_available(&self) -> bool;

    /// Open `name` at `version`.
    ///
    /// `None` opens at the current version (creating the database at version 1).
    /// A version above the current one runs `upgrade` in a version-change
    /// transaction before the open resolves. A lower one fails with `VersionError`.
    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<UpgradeFn>,
    ) -> Result<Self::Database>;

    /// Destroy `name` and everything in it. Deleting a missing database succeeds.
    async fn delete_database(&self, name: &str) -> Result<ReadyState>;
}

/// One live connection to a database.
pub trait Database {
    type Transaction: Transaction;

    fn name(&self) -> String;

    fn version(&self) -> u64;

    fn store_names(&self) -> Vec<String>;

    fn contains_store(&self, name: &str) -> bool {
        self.store_names().iter().any(|s| s == name)
    }

    /// Start a transaction scoped to `stores`.
    fn transaction(&self, stores: &[&str], mode: TransactionMode) -> Result<Self::Transaction>;

    /// Close the connection. Further transactions fail with `InvalidStateError`.
    fn close(&self);
}

#[allow(async_fn_in_trait)]
pub trait Transaction {
    type Store: ObjectStore;

    fn object_store(&self, name: &str) -> Result<Self::Store>;

    /// Wait for the transaction to commit.
    async fn done(&self) -> Result<()>;
}

/// Store handle scoped to a transaction.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    type Index: Index;

    fn name(&self) -> String;

    /// In-line key field, `None` for stores addressed by explicit keys.
    fn key_path(&self) -> Option<String>;

    async fn get(&self, key: &Key) -> Result<Option<Value>>;

    /// Insert or overwrite a record, resolving with its primary key.
    async fn put(&self, value: &Value, key: Option<&Key>) -> Result<Key>;

    async fn delete(&self, query: &KeyQuery) -> Result<ReadyState>;

    async fn clear(&self) -> Result<ReadyState>;

    fn index(&self, name: &str) -> Result<Self::Index>;
}

#[allow(async_fn_in_trait)]
pub trait Index {
    type Cursor: Cursor;

    /// Open a forward cursor over records whose index key falls in `range`.
    async fn open_cursor(&self, range: Option<&KeyRange>) -> Result<Self::Cursor>;
}

/// Lazy, forward-only, single-pass sequence of record values.
#[allow(async_fn_in_trait)]
pub trait Cursor {
    /// Yield the current record and step past it; `None` once exhausted.
    async fn advance(&mut self) -> Result<Option<Value>>;
}
