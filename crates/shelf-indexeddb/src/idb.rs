//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`. Each promise settles
//! exactly once: from the success callback or from the error callback.

use js_sys::Promise;
use shelf_core::{ReadyState, Result, ShelfError, UpgradeFn, VersionChange};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{IdbDatabase, IdbFactory, IdbOpenDbRequest, IdbRequest, IdbTransaction};

use crate::error::engine_error;

/// Type alias for event closures to reduce complexity
type EventClosure = Closure<dyn FnMut(web_sys::Event)>;

/// Type alias for upgrade closure to reduce complexity
type UpgradeClosure = Rc<RefCell<Option<Closure<dyn FnMut(web_sys::IdbVersionChangeEvent)>>>>;

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| ShelfError::Unsupported("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(ShelfError::Unsupported("indexedDB is null/undefined".into()));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| ShelfError::Unsupported("indexedDB is not IdbFactory".into()))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's result.
///
/// Rejects with the request's DOMException so its name survives. The failing
/// request does not abort its transaction.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req_success = req.clone();
    let req_error = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Store closures in Rc<RefCell> to manage their lifetime without leaking
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let req_s = req_success.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req_error.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |event: web_sys::Event| {
            // A handled request error leaves the transaction running, so
            // earlier requests in it still commit
            event.prevent_default();
            let err = req_e
                .error()
                .ok()
                .flatten()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("unknown IDB error"));
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req_success.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req_error.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        // Keep both closures alive until one fires
        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction completion into a JS Promise.
///
/// Both `error` and `abort` reject.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx_complete = tx.clone();
    let tx_error = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        type Handlers = (EventClosure, EventClosure, EventClosure);
        let closures: Rc<RefCell<Option<Handlers>>> = Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let make_reject = |fallback: &'static str| {
            let tx_e = tx_error.clone();
            let reject = reject.clone();
            let closures_for_error = closures.clone();
            Closure::wrap(Box::new(move |_event: web_sys::Event| {
                let err = tx_e
                    .error()
                    .map(JsValue::from)
                    .unwrap_or_else(|| JsValue::from_str(fallback));
                let _ = reject.call1(&JsValue::UNDEFINED, &err);
                *closures_for_error.borrow_mut() = None;
            }) as Box<dyn FnMut(web_sys::Event)>)
        };
        let on_error = make_reject("transaction error");
        let on_abort = make_reject("transaction aborted");

        tx_complete.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx_complete.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx_complete.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Schema access handed to upgrade hooks inside `onupgradeneeded`.
struct WebVersionChange {
    db: IdbDatabase,
    tx: Option<IdbTransaction>,
    database: String,
    old_version: u64,
    new_version: u64,
}

impl VersionChange for WebVersionChange {
    fn old_version(&self) -> u64 {
        self.old_version
    }

    fn new_version(&self) -> u64 {
        self.new_version
    }

    fn store_names(&self) -> Vec<String> {
        dom_strings(&self.db.object_store_names())
    }

    fn contains_store(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn create_store(&mut self, name: &str, key_path: Option<&str>) -> Result<()> {
        match key_path {
            Some(path) => {
                let params = web_sys::IdbObjectStoreParameters::new();
                js_sys::Reflect::set(&params, &"keyPath".into(), &path.into())
                    .map_err(engine_error)?;
                self.db
                    .create_object_store_with_optional_parameters(name, &params)
                    .map_err(engine_error)?;
            }
            None => {
                self.db.create_object_store(name).map_err(engine_error)?;
            }
        }
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> Result<()> {
        self.db.delete_object_store(name).map_err(engine_error)
    }

    fn create_index(&mut self, store: &str, name: &str, field: &str, unique: bool) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            ShelfError::engine("InvalidStateError", "no version change transaction")
        })?;
        let object_store = tx.object_store(store).map_err(engine_error)?;
        let params = web_sys::IdbIndexParameters::new();
        js_sys::Reflect::set(&params, &"unique".into(), &JsValue::from_bool(unique))
            .map_err(engine_error)?;
        object_store
            .create_index_with_str_and_optional_parameters(name, field, &params)
            .map_err(engine_error)?;
        Ok(())
    }
}

/// Collect a DOMStringList.
pub fn dom_strings(list: &web_sys::DomStringList) -> Vec<String> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

/// Open `db_name`, at `version` when given, running `upgrade` on version change.
///
/// An upgrade hook error aborts the version change and is what the open fails
/// with. A blocked upgrade is only logged; the open stays pending until the
/// other connections close.
pub async fn open_database(
    db_name: &str,
    version: Option<u64>,
    upgrade: Option<UpgradeFn>,
) -> Result<IdbDatabase> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = match version {
        Some(v) => factory.open_with_f64(db_name, v as f64),
        None => factory.open(db_name),
    }
    .map_err(engine_error)?;

    // Store closures to manage their lifetime without leaking
    let upgrade_closure: UpgradeClosure = Rc::new(RefCell::new(None));
    let hook: Rc<RefCell<Option<UpgradeFn>>> = Rc::new(RefCell::new(upgrade));
    let hook_error: Rc<RefCell<Option<ShelfError>>> = Rc::new(RefCell::new(None));

    let name = db_name.to_string();
    let hook_error_for_upgrade = hook_error.clone();
    let on_upgrade = Closure::wrap(Box::new(move |event: web_sys::IdbVersionChangeEvent| {
        let Some(req) = event
            .target()
            .and_then(|t| t.dyn_into::<IdbOpenDbRequest>().ok())
        else {
            return;
        };
        let Ok(db) = req.result().map(|r| r.unchecked_into::<IdbDatabase>()) else {
            return;
        };
        let mut change = WebVersionChange {
            db,
            tx: req.transaction(),
            database: name.clone(),
            old_version: event.old_version() as u64,
            new_version: event.new_version().unwrap_or_default() as u64,
        };
        debug!(
            "{} version change '{}' v{} -> v{}",
            shelf_core::logging::prefix::DB,
            change.database,
            change.old_version,
            change.new_version
        );
        if let Some(hook) = hook.borrow_mut().take() {
            if let Err(err) = hook(&mut change) {
                warn!("upgrade of '{}' failed: {}", change.database, err);
                *hook_error_for_upgrade.borrow_mut() = Some(err);
                if let Some(tx) = &change.tx {
                    let _ = tx.abort();
                }
            }
        }
    }) as Box<dyn FnMut(web_sys::IdbVersionChangeEvent)>);
    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    *upgrade_closure.borrow_mut() = Some(on_upgrade);

    let blocked_name = db_name.to_string();
    let on_blocked = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        warn!(
            "{} upgrade of '{}' blocked by connections in other contexts",
            shelf_core::logging::prefix::DB,
            blocked_name
        );
    }) as Box<dyn FnMut(web_sys::Event)>);
    open_req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));

    let open_promise = request_to_promise(open_req.unchecked_ref());
    let result = wasm_bindgen_futures::JsFuture::from(open_promise).await;

    // Clean up closures now that open is complete
    open_req.set_onupgradeneeded(None);
    open_req.set_onblocked(None);
    *upgrade_closure.borrow_mut() = None;
    drop(on_blocked);

    let result = match result {
        Ok(val) => val,
        Err(err) => {
            let hook_err = hook_error.borrow_mut().take();
            return Err(hook_err.unwrap_or_else(|| engine_error(err)));
        }
    };

    result
        .dyn_into::<IdbDatabase>()
        .map_err(|_| ShelfError::engine("UnknownError", "open result is not IdbDatabase"))
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> Result<JsValue> {
    let promise = request_to_promise(req);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(engine_error)
}

/// Await an IdbTransaction to complete.
pub async fn await_transaction(tx: &IdbTransaction) -> Result<()> {
    let promise = transaction_to_promise(tx);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(engine_error)?;
    Ok(())
}

/// Ready state of a settled request.
pub fn ready_state(req: &IdbRequest) -> ReadyState {
    match req.ready_state() {
        web_sys::IdbRequestReadyState::Pending => ReadyState::Pending,
        _ => ReadyState::Done,
    }
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<ReadyState> {
    let factory = idb_factory()?;
    let req = factory.delete_database(db_name).map_err(engine_error)?;
    await_request(req.unchecked_ref()).await?;
    Ok(ready_state(req.unchecked_ref()))
}
