//! Shelf Core
//!
//! A control layer over an asynchronous, event-driven object store engine. It
//! turns database lifecycle management, schema upgrades and record access into
//! plain `async` calls:
//!
//! - **Connections**: one handle per database, reopened one version up on every call
//! - **Schema**: stores and secondary indexes created or dropped in upgrade transactions
//! - **Records**: get, cursor range scans, upserts (single or batched), deletes, clear
//!
//! The engine itself is a collaborator behind the traits in [`engine`]. The
//! in-memory [`MemoryEngine`] ships here; the browser engine lives in
//! `shelf-indexeddb`.
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use serde_json::json;
//! use shelf_core::{IndexSpec, Key, MemoryEngine, RangeEnd, Shelf};
//!
//! block_on(async {
//!     let mut shelf = Shelf::new(MemoryEngine::new(), "app");
//!     assert!(shelf.is_supported());
//!
//!     let indexes = IndexSpec::new().field("age", false);
//!     shelf.add_store("people", Some(indexes), false, Some("id")).await.unwrap();
//!
//!     let batch = json!([{"id": 1, "age": 31}, {"id": 2, "age": 12}]);
//!     shelf.set("people", &batch, None).await.unwrap();
//!
//!     let adults = shelf
//!         .find("people", "age", Some(Key::from(18)), RangeEnd::AtLeast)
//!         .await
//!         .unwrap();
//!     assert_eq!(adults, vec![json!({"id": 1, "age": 31})]);
//! });
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod key;
pub mod logging;
pub mod range;
pub mod records;
pub mod schema;
pub mod shelf;

// Re-export main types at crate root
pub use config::ShelfConfig;
pub use connection::ConnectionManager;
pub use engine::{
    Cursor, Database, Engine, Index, MemoryEngine, ObjectStore, ReadyState, Transaction,
    TransactionMode, UpgradeFn, VersionChange,
};
pub use error::{Result, ShelfError};
pub use key::Key;
pub use range::{translate, Bound, KeyQuery, KeyRange, RangeEnd};
pub use records::Stored;
pub use schema::IndexSpec;
pub use shelf::Shelf;
