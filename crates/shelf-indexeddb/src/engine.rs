//! IndexedDB implementation of the shelf engine traits

use serde_json::Value;
use shelf_core::logging::prefix;
use shelf_core::{
    Cursor, Database, Engine, Index, Key, KeyQuery, KeyRange, ObjectStore, ReadyState, Result,
    ShelfError, Transaction, TransactionMode, UpgradeFn,
};
use tracing::{debug, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    IdbCursorWithValue, IdbDatabase, IdbIndex, IdbObjectStore, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::convert::{js_to_key, js_to_value, key_to_js, range_to_js, value_to_js};
use crate::error::engine_error;
use crate::idb;

/// The browser's `indexedDB` factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdbEngine;

impl IdbEngine {
    pub fn new() -> Self {
        IdbEngine
    }
}

impl Engine for IdbEngine {
    type Database = WebDatabase;

    fn is_available(&self) -> bool {
        idb::idb_factory().is_ok()
    }

    async fn open(
        &self,
        name: &str,
        version: Option<u64>,
        upgrade: Option<UpgradeFn>,
    ) -> Result<WebDatabase> {
        let db = idb::open_database(name, version, upgrade).await?;
        Ok(WebDatabase::new(db))
    }

    async fn delete_database(&self, name: &str) -> Result<ReadyState> {
        info!("{} deleting database '{}'", prefix::DB, name);
        idb::delete_database(name).await
    }
}

/// Open IndexedDB connection.
///
/// Closes itself when another context starts a version change, so upgrades
/// from other instances are not blocked by this one.
pub struct WebDatabase {
    db: IdbDatabase,
    _on_version_change: Closure<dyn FnMut(web_sys::Event)>,
}

impl WebDatabase {
    fn new(db: IdbDatabase) -> Self {
        let db_for_close = db.clone();
        let on_version_change = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            debug!(
                "{} '{}' changing version elsewhere, closing",
                prefix::CLOSE,
                db_for_close.name()
            );
            db_for_close.close();
        }) as Box<dyn FnMut(web_sys::Event)>);
        db.set_onversionchange(Some(on_version_change.as_ref().unchecked_ref()));
        WebDatabase {
            db,
            _on_version_change: on_version_change,
        }
    }

    /// The underlying `IDBDatabase`.
    pub fn raw(&self) -> &IdbDatabase {
        &self.db
    }
}

impl Drop for WebDatabase {
    fn drop(&mut self) {
        self.db.set_onversionchange(None);
    }
}

impl Database for WebDatabase {
    type Transaction = WebTransaction;

    fn name(&self) -> String {
        self.db.name()
    }

    fn version(&self) -> u64 {
        self.db.version() as u64
    }

    fn store_names(&self) -> Vec<String> {
        idb::dom_strings(&self.db.object_store_names())
    }

    fn contains_store(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn transaction(&self, stores: &[&str], mode: TransactionMode) -> Result<WebTransaction> {
        let names: js_sys::Array = stores.iter().map(|s| JsValue::from_str(s)).collect();
        let idb_mode = match mode {
            TransactionMode::ReadOnly => IdbTransactionMode::Readonly,
            TransactionMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let tx = self
            .db
            .transaction_with_str_sequence_and_mode(&names, idb_mode)
            .map_err(engine_error)?;
        Ok(WebTransaction { tx })
    }

    fn close(&self) {
        self.db.close();
    }
}

pub struct WebTransaction {
    tx: IdbTransaction,
}

impl Transaction for WebTransaction {
    type Store = WebObjectStore;

    fn object_store(&self, name: &str) -> Result<WebObjectStore> {
        let store = self.tx.object_store(name).map_err(engine_error)?;
        Ok(WebObjectStore { store })
    }

    async fn done(&self) -> Result<()> {
        idb::await_transaction(&self.tx).await
    }
}

pub struct WebObjectStore {
    store: IdbObjectStore,
}

impl WebObjectStore {
    async fn settle(req: IdbRequest) -> Result<ReadyState> {
        idb::await_request(&req).await?;
        Ok(idb::ready_state(&req))
    }
}

impl ObjectStore for WebObjectStore {
    type Index = WebIndex;

    fn name(&self) -> String {
        self.store.name()
    }

    fn key_path(&self) -> Option<String> {
        self.store.key_path().ok().and_then(|path| path.as_string())
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let req = self.store.get(&key_to_js(key)).map_err(engine_error)?;
        let result = idb::await_request(&req).await?;
        js_to_value(&result)
    }

    async fn put(&self, value: &Value, key: Option<&Key>) -> Result<Key> {
        let js_value = value_to_js(value)?;
        let req = match key {
            Some(key) => self.store.put_with_key(&js_value, &key_to_js(key)),
            None => self.store.put(&js_value),
        }
        .map_err(engine_error)?;
        let result = idb::await_request(&req).await?;
        js_to_key(&result)
    }

    async fn delete(&self, query: &KeyQuery) -> Result<ReadyState> {
        let req = match query {
            KeyQuery::Key(key) => self.store.delete(&key_to_js(key)),
            KeyQuery::Range(range) => match range_to_js(range)? {
                Some(native) => self.store.delete(&native),
                None => self.store.clear(),
            },
        }
        .map_err(engine_error)?;
        Self::settle(req).await
    }

    async fn clear(&self) -> Result<ReadyState> {
        let req = self.store.clear().map_err(engine_error)?;
        Self::settle(req).await
    }

    fn index(&self, name: &str) -> Result<WebIndex> {
        let index = self.store.index(name).map_err(engine_error)?;
        Ok(WebIndex { index })
    }
}

pub struct WebIndex {
    index: IdbIndex,
}

impl Index for WebIndex {
    type Cursor = WebCursor;

    async fn open_cursor(&self, range: Option<&KeyRange>) -> Result<WebCursor> {
        let native = range.map(range_to_js).transpose()?.flatten();
        let request = match native {
            Some(native) => self.index.open_cursor_with_range(&native),
            None => self.index.open_cursor(),
        }
        .map_err(engine_error)?;
        Ok(WebCursor {
            request,
            current: None,
            exhausted: false,
        })
    }
}

/// Forward cursor driven by repeated `success` events of one request.
pub struct WebCursor {
    request: IdbRequest,
    current: Option<IdbCursorWithValue>,
    exhausted: bool,
}

impl Cursor for WebCursor {
    async fn advance(&mut self) -> Result<Option<Value>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(cursor) = self.current.take() {
            cursor.continue_().map_err(engine_error)?;
        }
        let result = idb::await_request(&self.request).await?;
        if result.is_null() || result.is_undefined() {
            self.exhausted = true;
            return Ok(None);
        }
        let cursor = result
            .dyn_into::<IdbCursorWithValue>()
            .map_err(|_| ShelfError::engine("UnknownError", "cursor result has no value"))?;
        let value = js_to_value(&cursor.value().map_err(engine_error)?)?;
        self.current = Some(cursor);
        Ok(value)
    }
}
