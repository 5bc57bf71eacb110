//! In-memory engine
//!
//! A BTreeMap-based implementation of the engine traits for testing and native
//! use. Not persistent. Behaves like the browser engine where the control layer
//! can observe it: version checks, connection invalidation on version change,
//! in-line key rules, unique indexes and read-only transactions.
//!
//! Writes apply immediately; a failing request does not roll back earlier
//! requests of the same transaction.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{
    Cursor, Database, Engine, Index, ObjectStore, ReadyState, Transaction, TransactionMode,
    UpgradeFn, VersionChange,
};
use crate::error::{Result, ShelfError};
use crate::key::{field_key, Key};
use crate::logging::prefix;
use crate::range::{KeyQuery, KeyRange};

#[derive(Debug, Clone)]
struct IndexState {
    field: String,
    unique: bool,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    key_path: Option<String>,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexState>,
}

impl StoreState {
    /// (index key, primary key, value) for every record the index covers, in cursor order.
    fn index_entries(&self, index: &IndexState) -> Vec<(Key, Key, Value)> {
        let mut entries: Vec<(Key, Key, Value)> = self
            .records
            .iter()
            .filter_map(|(pk, value)| match field_key(value, &index.field) {
                Some(Ok(ik)) => Some((ik, pk.clone(), value.clone())),
                _ => None,
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        entries
    }

    fn unique_violation(&self, index: &IndexState, pk: &Key, value: &Value) -> bool {
        let Some(Ok(ik)) = field_key(value, &index.field) else {
            return false;
        };
        self.records.iter().any(|(other_pk, other)| {
            other_pk != pk && matches!(field_key(other, &index.field), Some(Ok(k)) if k == ik)
        })
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    version: u64,
    stores: BTreeMap<String, StoreState>,
    live: HashSet<u64>,
}

#[derive(Debug)]
struct Catalog {
    available: bool,
    reject_blocked: bool,
    next_connection: u64,
    databases: HashMap<String, DatabaseState>,
}

type SharedCatalog = Rc<RefCell<Catalog>>;

/// In-memory object store engine.
///
/// Cloning yields another handle onto the same databases, the way every page
/// of an origin shares one browser engine.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    catalog: SharedCatalog,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            catalog: Rc::new(RefCell::new(Catalog {
                available: true,
                reject_blocked: false,
                next_connection: 1,
                databases: HashMap::new(),
            })),
        }
    }

    /// Engine reporting itself absent, as in a host without storage support.
    pub fn unavailable() -> Self {
        let engine = Self::new();
        engine.catalog.borrow_mut().available = false;
        engine
    }

    /// Fail version changes with `UpgradeBlocked` while other connections are
    /// live, instead of logging and invalidating them.
    pub fn reject_blocked_upgrades(self, reject: bool) -> Self {
        self.catalog.borrow_mut().reject_blocked = reject;
        self
    }

    /// Current version of `name`, if it exists.
    pub fn version(&self, name: &str) -> Option<u64> {
        self.catalog.borrow().databases.get(name).map(|d| d.version)
    }

    /// Number of connections to `name` that are neither closed nor invalidated.
    pub fn live_connections(&self, name: &str) -> usize {
        self.catalog
            .borrow()
            .databases
            .get(name)
            .map_or(0, |d| d.live.len())
    }

    /// Index names of `store`, sorted.
    pub fn index_names(&self, name: &str, store: &str) -> Vec<String> {
        self.catalog
            .borrow()
            .databases
            .get(name)
            .and_then(|d| d.stores.get(store))
            .map(|s| s.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the index `index` of `store` enforces uniqueness.
    pub fn index_is_unique(&self, name: &str, store: &str, index: &str) -> Option<bool> {
        self.catalog
            .borrow()
            .databases
            .get(name)
            .and_then(|d| d.stores.get(store))
            .and_then(|s| s.indexes.get(index))
            .map(|i| i.unique)
    }

    /// Number of records in `store`.
    pub fn record_count(&self, name: &str, store: &str) -> usize {
        self.catalog
            .borrow()
            .databases
            .get(name)
            .and_then(|d| d.stores.get(store))
            .map_or(0, |s| s.records.len())
    }
}

impl Engine for MemoryEngine {
    type Database = MemoryDatabase;

    fn is_available(&self) -> bool {
        self.catalog.borrow().available
    }

    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<UpgradeFn>,
    ) -> Result<MemoryDatabase> {
        if version == Some(0) {
            return Err(ShelfError::engine("TypeError", "version must be positive"));
        }

        let mut catalog = self.catalog.borrow_mut();
        if !catalog.available {
            return Err(ShelfError::engine(
                "NotSupportedError",
                "memory engine is disabled",
            ));
        }
        let reject_blocked = catalog.reject_blocked;
        let id = catalog.next_connection;
        catalog.next_connection += 1;

        let current = catalog.databases.get(name).map(|d| d.version);
        let target = version.or(current).unwrap_or(1);
        if let Some(current) = current {
            if target < current {
                return Err(ShelfError::engine(
                    "VersionError",
                    format!(
                        "requested version ({}) is less than the existing version ({})",
                        target, current
                    ),
                ));
            }
        }

        let db = catalog.databases.entry(name.to_string()).or_default();
        if current.map_or(true, |c| target > c) {
            if !db.live.is_empty() {
                if reject_blocked {
                    return Err(ShelfError::UpgradeBlocked {
                        database: name.to_string(),
                        version: target,
                    });
                }
                warn!(
                    "{} upgrade of '{}' to v{} blocked by {} open connection(s), invalidating them",
                    prefix::DB,
                    name,
                    target,
                    db.live.len()
                );
                db.live.clear();
            }

            let mut change = MemoryVersionChange {
                old_version: db.version,
                new_version: target,
                stores: db.stores.clone(),
            };
            if let Some(hook) = upgrade {
                if let Err(err) = hook(&mut change) {
                    if current.is_none() {
                        catalog.databases.remove(name);
                    }
                    return Err(err);
                }
            }
            debug!(
                "{} version change '{}' v{} -> v{}",
                prefix::DB,
                name,
                change.old_version,
                target
            );
            db.stores = change.stores;
            db.version = target;
        }
        db.live.insert(id);

        Ok(MemoryDatabase {
            catalog: self.catalog.clone(),
            name: name.to_string(),
            version: target,
            id,
            closed: Rc::new(Cell::new(false)),
        })
    }

    async fn delete_database(&self, name: &str) -> Result<ReadyState> {
        let mut catalog = self.catalog.borrow_mut();
        if !catalog.available {
            return Err(ShelfError::engine(
                "NotSupportedError",
                "memory engine is disabled",
            ));
        }
        if let Some(db) = catalog.databases.remove(name) {
            if !db.live.is_empty() {
                warn!(
                    "{} deleting '{}' with {} open connection(s)",
                    prefix::DB,
                    name,
                    db.live.len()
                );
            }
        }
        Ok(ReadyState::Done)
    }
}

struct MemoryVersionChange {
    old_version: u64,
    new_version: u64,
    stores: BTreeMap<String, StoreState>,
}

impl VersionChange for MemoryVersionChange {
    fn old_version(&self) -> u64 {
        self.old_version
    }

    fn new_version(&self) -> u64 {
        self.new_version
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn create_store(&mut self, name: &str, key_path: Option<&str>) -> Result<()> {
        if self.stores.contains_key(name) {
            return Err(ShelfError::engine(
                "ConstraintError",
                format!("object store '{}' already exists", name),
            ));
        }
        self.stores.insert(
            name.to_string(),
            StoreState {
                key_path: key_path.map(str::to_string),
                ..StoreState::default()
            },
        );
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> Result<()> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found_store(name))
    }

    fn create_index(&mut self, store: &str, name: &str, field: &str, unique: bool) -> Result<()> {
        let state = self
            .stores
            .get_mut(store)
            .ok_or_else(|| not_found_store(store))?;
        if state.indexes.contains_key(name) {
            return Err(ShelfError::engine(
                "ConstraintError",
                format!("index '{}' already exists on '{}'", name, store),
            ));
        }
        let index = IndexState {
            field: field.to_string(),
            unique,
        };
        if unique {
            let entries = state.index_entries(&index);
            if entries.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(ShelfError::engine(
                    "ConstraintError",
                    format!("existing records violate unique index '{}'", name),
                ));
            }
        }
        state.indexes.insert(name.to_string(), index);
        Ok(())
    }
}

fn not_found_store(name: &str) -> ShelfError {
    ShelfError::engine(
        "NotFoundError",
        format!("object store '{}' not found", name),
    )
}

/// Connection handle to a database of a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryDatabase {
    catalog: SharedCatalog,
    name: String,
    version: u64,
    id: u64,
    closed: Rc<Cell<bool>>,
}

/// Shared connection identity checked by every transaction-scoped call.
#[derive(Debug, Clone)]
struct Link {
    catalog: SharedCatalog,
    database: String,
    id: u64,
}

impl Link {
    fn with_db<T>(&self, f: impl FnOnce(&mut DatabaseState) -> Result<T>) -> Result<T> {
        let mut catalog = self.catalog.borrow_mut();
        match catalog.databases.get_mut(&self.database) {
            Some(db) if db.live.contains(&self.id) => f(db),
            _ => Err(ShelfError::engine(
                "InvalidStateError",
                "the database connection is closing",
            )),
        }
    }

    fn with_store<T>(
        &self,
        store: &str,
        f: impl FnOnce(&mut StoreState) -> Result<T>,
    ) -> Result<T> {
        self.with_db(|db| {
            let state = db
                .stores
                .get_mut(store)
                .ok_or_else(|| not_found_store(store))?;
            f(state)
        })
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.catalog
            .borrow()
            .databases
            .get(&self.name)
            .map(|d| d.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(&self, stores: &[&str], mode: TransactionMode) -> Result<MemoryTransaction> {
        if self.closed.get() {
            return Err(ShelfError::engine(
                "InvalidStateError",
                "the database connection is closing",
            ));
        }
        if stores.is_empty() {
            return Err(ShelfError::engine(
                "InvalidAccessError",
                "a transaction needs at least one store",
            ));
        }
        let link = Link {
            catalog: self.catalog.clone(),
            database: self.name.clone(),
            id: self.id,
        };
        link.with_db(|db| {
            for store in stores {
                if !db.stores.contains_key(*store) {
                    return Err(not_found_store(store));
                }
            }
            Ok(())
        })?;
        Ok(MemoryTransaction {
            link,
            scope: stores.iter().map(|s| s.to_string()).collect(),
            mode,
        })
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(db) = self.catalog.borrow_mut().databases.get_mut(&self.name) {
            db.live.remove(&self.id);
        }
    }
}

#[derive(Debug)]
pub struct MemoryTransaction {
    link: Link,
    scope: Vec<String>,
    mode: TransactionMode,
}

impl Transaction for MemoryTransaction {
    type Store = MemoryObjectStore;

    fn object_store(&self, name: &str) -> Result<MemoryObjectStore> {
        if !self.scope.iter().any(|s| s == name) {
            return Err(not_found_store(name));
        }
        Ok(MemoryObjectStore {
            link: self.link.clone(),
            name: name.to_string(),
            mode: self.mode,
        })
    }

    async fn done(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryObjectStore {
    link: Link,
    name: String,
    mode: TransactionMode,
}

impl MemoryObjectStore {
    fn require_write(&self) -> Result<()> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(ShelfError::engine(
                "ReadOnlyError",
                "the transaction is read-only",
            )),
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    type Index = MemoryIndex;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn key_path(&self) -> Option<String> {
        self.link
            .with_store(&self.name, |s| Ok(s.key_path.clone()))
            .unwrap_or(None)
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.link
            .with_store(&self.name, |s| Ok(s.records.get(key).cloned()))
    }

    async fn put(&self, value: &Value, key: Option<&Key>) -> Result<Key> {
        self.require_write()?;
        self.link.with_store(&self.name, |s| {
            let pk = match (&s.key_path, key) {
                (Some(_), Some(_)) => {
                    return Err(ShelfError::engine(
                        "DataError",
                        "the object store uses in-line keys and the key parameter was provided",
                    ))
                }
                (Some(path), None) => match field_key(value, path) {
                    Some(Ok(k)) => k,
                    Some(Err(e)) => return Err(ShelfError::engine("DataError", e.to_string())),
                    None => {
                        return Err(ShelfError::engine(
                            "DataError",
                            format!("evaluating the key path '{}' did not yield a value", path),
                        ))
                    }
                },
                (None, Some(k)) => k.clone(),
                (None, None) => {
                    return Err(ShelfError::engine(
                        "DataError",
                        "the object store uses out-of-line keys and the key parameter \
                         was not provided",
                    ))
                }
            };
            for (name, index) in &s.indexes {
                if index.unique && s.unique_violation(index, &pk, value) {
                    return Err(ShelfError::engine(
                        "ConstraintError",
                        format!("unique index '{}' already holds this value", name),
                    ));
                }
            }
            s.records.insert(pk.clone(), value.clone());
            Ok(pk)
        })
    }

    async fn delete(&self, query: &KeyQuery) -> Result<ReadyState> {
        self.require_write()?;
        self.link.with_store(&self.name, |s| {
            s.records.retain(|k, _| !query.matches(k));
            Ok(ReadyState::Done)
        })
    }

    async fn clear(&self) -> Result<ReadyState> {
        self.require_write()?;
        self.link.with_store(&self.name, |s| {
            s.records.clear();
            Ok(ReadyState::Done)
        })
    }

    fn index(&self, name: &str) -> Result<MemoryIndex> {
        let index = self.link.with_store(&self.name, |s| {
            s.indexes.get(name).cloned().ok_or_else(|| {
                ShelfError::engine("NotFoundError", format!("index '{}' not found", name))
            })
        })?;
        Ok(MemoryIndex {
            link: self.link.clone(),
            store: self.name.clone(),
            index,
        })
    }
}

#[derive(Debug)]
pub struct MemoryIndex {
    link: Link,
    store: String,
    index: IndexState,
}

impl Index for MemoryIndex {
    type Cursor = MemoryCursor;

    async fn open_cursor(&self, range: Option<&KeyRange>) -> Result<MemoryCursor> {
        let pending = self.link.with_store(&self.store, |s| {
            Ok(s.index_entries(&self.index)
                .into_iter()
                .filter(|(ik, _, _)| range.map_or(true, |r| r.contains(ik)))
                .map(|(_, _, value)| value)
                .collect::<VecDeque<_>>())
        })?;
        Ok(MemoryCursor { pending })
    }
}

/// Cursor over a snapshot of the matching records taken when it was opened.
#[derive(Debug)]
pub struct MemoryCursor {
    pending: VecDeque<Value>,
}

impl Cursor for MemoryCursor {
    async fn advance(&mut self) -> Result<Option<Value>> {
        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn schema(key_path: Option<&'static str>) -> Option<UpgradeFn> {
        Some(Box::new(move |vc: &mut dyn VersionChange| {
            vc.create_store("items", key_path)?;
            vc.create_index("items", "rank", "rank", false)?;
            vc.create_index("items", "code", "code", true)
        }))
    }

    #[test]
    fn test_open_creates_at_version_one() {
        let engine = MemoryEngine::new();
        let db = block_on(engine.open("db", None, None)).unwrap();
        assert_eq!(db.version(), 1);
        assert_eq!(engine.version("db"), Some(1));
        assert_eq!(engine.live_connections("db"), 1);
        db.close();
        assert_eq!(engine.live_connections("db"), 0);
    }

    #[test]
    fn test_lower_version_fails() {
        let engine = MemoryEngine::new();
        block_on(engine.open("db", Some(5), None)).unwrap().close();
        let err = block_on(engine.open("db", Some(3), None)).unwrap_err();
        assert_eq!(err.engine_name(), Some("VersionError"));
    }

    #[test]
    fn test_failed_upgrade_keeps_previous_schema() {
        let engine = MemoryEngine::new();
        block_on(engine.open("db", Some(2), schema(None))).unwrap().close();
        let failing: UpgradeFn = Box::new(|vc: &mut dyn VersionChange| {
            vc.delete_store("items")?;
            vc.delete_store("items")
        });
        let err = block_on(engine.open("db", Some(3), Some(failing))).unwrap_err();
        assert_eq!(err.engine_name(), Some("NotFoundError"));
        assert_eq!(engine.version("db"), Some(2));
        assert_eq!(engine.index_names("db", "items"), vec!["code", "rank"]);
    }

    #[test]
    fn test_version_change_invalidates_other_connections() {
        let engine = MemoryEngine::new();
        let first = block_on(engine.open("db", Some(2), schema(None))).unwrap();
        let second = block_on(engine.open("db", Some(3), None)).unwrap();
        let err = first
            .transaction(&["items"], TransactionMode::ReadOnly)
            .unwrap_err();
        assert_eq!(err.engine_name(), Some("InvalidStateError"));
        assert!(second
            .transaction(&["items"], TransactionMode::ReadOnly)
            .is_ok());
    }

    #[test]
    fn test_blocked_upgrade_can_be_rejected() {
        let engine = MemoryEngine::new().reject_blocked_upgrades(true);
        let _held = block_on(engine.open("db", Some(1), None)).unwrap();
        let err = block_on(engine.open("db", Some(2), None)).unwrap_err();
        assert!(matches!(err, ShelfError::UpgradeBlocked { version: 2, .. }));
    }

    #[test]
    fn test_inline_key_rules() {
        let engine = MemoryEngine::new();
        let db = block_on(engine.open("db", Some(2), schema(Some("id")))).unwrap();
        let tx = db
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();
        let store = tx.object_store("items").unwrap();

        let key = block_on(store.put(&json!({"id": 1}), None)).unwrap();
        assert_eq!(key, Key::from(1));

        let err = block_on(store.put(&json!({"id": 2}), Some(&Key::from(2)))).unwrap_err();
        assert_eq!(err.engine_name(), Some("DataError"));

        let err = block_on(store.put(&json!({"other": 2}), None)).unwrap_err();
        assert_eq!(err.engine_name(), Some("DataError"));
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let engine = MemoryEngine::new();
        let db = block_on(engine.open("db", Some(2), schema(None))).unwrap();
        let tx = db
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();
        let store = tx.object_store("items").unwrap();

        block_on(store.put(&json!({"code": "a"}), Some(&Key::from(1)))).unwrap();
        // Overwriting the same record keeps its own index value
        block_on(store.put(&json!({"code": "a"}), Some(&Key::from(1)))).unwrap();
        let err = block_on(store.put(&json!({"code": "a"}), Some(&Key::from(2)))).unwrap_err();
        assert_eq!(err.engine_name(), Some("ConstraintError"));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let db = block_on(engine.open("db", Some(2), schema(None))).unwrap();
        let tx = db
            .transaction(&["items"], TransactionMode::ReadOnly)
            .unwrap();
        let store = tx.object_store("items").unwrap();
        let err = block_on(store.clear()).unwrap_err();
        assert_eq!(err.engine_name(), Some("ReadOnlyError"));
    }

    #[test]
    fn test_cursor_orders_by_index_then_primary_key() {
        let engine = MemoryEngine::new();
        let db = block_on(engine.open("db", Some(2), schema(None))).unwrap();
        let tx = db
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();
        let store = tx.object_store("items").unwrap();
        block_on(store.put(&json!({"rank": 2, "n": "c"}), Some(&Key::from("c")))).unwrap();
        block_on(store.put(&json!({"rank": 1, "n": "b"}), Some(&Key::from("b")))).unwrap();
        block_on(store.put(&json!({"rank": 1, "n": "a"}), Some(&Key::from("a")))).unwrap();
        block_on(store.put(&json!({"n": "unindexed"}), Some(&Key::from("d")))).unwrap();

        let index = store.index("rank").unwrap();
        let mut cursor = block_on(index.open_cursor(None)).unwrap();
        let mut names = Vec::new();
        while let Some(value) = block_on(cursor.advance()).unwrap() {
            names.push(value["n"].as_str().unwrap().to_string());
        }
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
