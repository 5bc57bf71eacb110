//! IndexedDB engine for shelf (browser WASM)
//!
//! This crate implements the `shelf-core` engine traits on top of the browser's
//! IndexedDB through `web-sys`, and exports the promise-based `IndexedDB` class
//! to JavaScript.
//!
//! IndexedDB reports results through `onsuccess`/`onerror` callbacks. Each
//! request is bridged into a `js_sys::Promise` that settles exactly once and is
//! awaited as a `JsFuture`, so the control layer in `shelf-core` drives the
//! browser engine with the same code it drives the memory engine with.
//!
//! Records cross the boundary as JSON. Keys are numbers, strings or arrays of keys.
//!
//! # Example
//!
//! ```javascript
//! import init, { IndexedDB } from "./shelf_indexeddb.js";
//!
//! await init();
//! const db = new IndexedDB("app");
//! if (db.isSupported()) {
//!   await db.addStore("people", { age: false, email: true }, false, "id");
//!   await db.set("people", [{ id: 1, age: 31 }, { id: 2, age: 12 }]);
//!   const adults = await db.find("people", "age", 18, false);
//! }
//! ```

pub mod bindings;
pub mod convert;
pub mod engine;
pub mod error;
pub mod idb;

pub use bindings::IndexedDb;
pub use engine::{IdbEngine, WebCursor, WebDatabase, WebIndex, WebObjectStore, WebTransaction};
pub use error::{engine_error, to_js_error};
