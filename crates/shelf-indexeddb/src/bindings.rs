//! Promise-based JavaScript class over [`Shelf`]
//!
//! Every method returns a `Promise`. Overlapping calls on one instance queue on
//! an async mutex and run one after another. Rejections are `Error` objects whose
//! `name` is the error kind (`StoreNotFoundError`, `EngineOperationError`, ...).

use futures::lock::Mutex;
use js_sys::{Array, Promise};
use shelf_core::{Engine, IndexSpec, Result, Shelf, ShelfConfig, Stored};
use std::future::Future;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::convert::{js_to_key, js_to_range_end, js_to_value, key_to_js, value_to_js};
use crate::engine::IdbEngine;
use crate::error::to_js_error;

/// Run `fut` as a JS promise, rejecting with the converted error.
fn spawn<F>(fut: F) -> Promise
where
    F: Future<Output = Result<JsValue>> + 'static,
{
    wasm_bindgen_futures::future_to_promise(async move { fut.await.map_err(to_js_error) })
}

fn is_absent(val: &JsValue) -> bool {
    val.is_undefined() || val.is_null()
}

/// Constructor argument: nothing, a database name or a config object.
fn parse_config(config: &JsValue) -> Result<ShelfConfig> {
    if is_absent(config) {
        return Ok(ShelfConfig::default());
    }
    if let Some(name) = config.as_string() {
        return Ok(ShelfConfig::new(name));
    }
    match js_to_value(config)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(ShelfConfig::default()),
    }
}

fn stored_to_js(stored: Stored) -> JsValue {
    match stored {
        Stored::One(key) => key_to_js(&key),
        Stored::Many(keys) => keys.iter().map(key_to_js).collect::<Array>().into(),
    }
}

/// IndexedDB database managed through promises.
#[wasm_bindgen(js_name = IndexedDB)]
pub struct IndexedDb {
    shelf: Rc<Mutex<Shelf<IdbEngine>>>,
}

#[wasm_bindgen(js_class = IndexedDB)]
impl IndexedDb {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> std::result::Result<IndexedDb, JsValue> {
        // Route Rust panics to console.error instead of "RuntimeError: unreachable"
        console_error_panic_hook::set_once();

        let config = parse_config(&config).map_err(to_js_error)?;
        Ok(IndexedDb {
            shelf: Rc::new(Mutex::new(Shelf::with_config(IdbEngine::new(), config))),
        })
    }

    /// Whether this environment provides IndexedDB.
    #[wasm_bindgen(js_name = isSupported)]
    pub fn is_supported(&self) -> bool {
        match self.shelf.try_lock() {
            Some(shelf) => shelf.is_supported(),
            None => IdbEngine::new().is_available(),
        }
    }

    #[wasm_bindgen(js_name = delDB)]
    pub fn del_db(&self) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let state = shelf.lock().await.del_db().await?;
            Ok(JsValue::from_str(state.as_str()))
        })
    }

    #[wasm_bindgen(js_name = hasStore)]
    pub fn has_store(&self, store: String) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let exists = shelf.lock().await.has_store(&store).await?;
            Ok(JsValue::from_bool(exists))
        })
    }

    /// Resolves with the upgraded `IDBDatabase`.
    #[wasm_bindgen(js_name = addStore)]
    pub fn add_store(
        &self,
        store: String,
        indexes: JsValue,
        replace: Option<bool>,
        key_path: Option<String>,
    ) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let spec = match js_to_value(&indexes)? {
                Some(value) => Some(IndexSpec::from_json(&value)),
                None => None,
            };
            let mut shelf = shelf.lock().await;
            let db = shelf
                .add_store(&store, spec, replace.unwrap_or(false), key_path.as_deref())
                .await?;
            Ok(db.raw().clone().into())
        })
    }

    #[wasm_bindgen(js_name = delStore)]
    pub fn del_store(&self, store: String) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let mut shelf = shelf.lock().await;
            let db = shelf.del_store(&store).await?;
            Ok(db.raw().clone().into())
        })
    }

    /// Resolves with the record or `undefined`.
    pub fn get(&self, store: String, key: JsValue) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let key = js_to_key(&key)?;
            match shelf.lock().await.get(&store, &key).await? {
                Some(value) => value_to_js(&value),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }

    pub fn find(&self, store: String, index: String, start: JsValue, end: JsValue) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let start = if start.is_undefined() {
                None
            } else {
                Some(js_to_key(&start)?)
            };
            let end = js_to_range_end(&end)?;
            let records = shelf.lock().await.find(&store, &index, start, end).await?;
            let array = Array::new();
            for record in &records {
                array.push(&value_to_js(record)?);
            }
            Ok(array.into())
        })
    }

    /// Resolves with the record's key, or the keys of an array in input order.
    pub fn set(&self, store: String, value: JsValue, key: JsValue) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let value = js_to_value(&value)?.ok_or_else(|| {
                shelf_core::ShelfError::InvalidArgument("value can't be undefined".into())
            })?;
            let key = js_to_value(&key)?;
            let stored = shelf.lock().await.set(&store, &value, key.as_ref()).await?;
            Ok(stored_to_js(stored))
        })
    }

    pub fn del(&self, store: String, start: JsValue, end: JsValue) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let start = js_to_key(&start)?;
            let end = if end.is_undefined() {
                None
            } else {
                Some(js_to_range_end(&end)?)
            };
            let state = shelf.lock().await.del(&store, start, end).await?;
            Ok(JsValue::from_str(state.as_str()))
        })
    }

    pub fn clear(&self, store: String) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            let state = shelf.lock().await.clear(&store).await?;
            Ok(JsValue::from_str(state.as_str()))
        })
    }

    /// Close the held connection, if any, once pending calls finish.
    pub fn close(&self) -> Promise {
        let shelf = self.shelf.clone();
        spawn(async move {
            shelf.lock().await.close();
            Ok(JsValue::UNDEFINED)
        })
    }
}
