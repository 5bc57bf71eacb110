//! Record operations
//!
//! Each operation opens a fresh connection (checking the store exists), runs one
//! short-lived transaction and closes the connection before returning, on the
//! error path as well.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{
    Cursor, Database, Engine, Index, ObjectStore, ReadyState, Transaction, TransactionMode,
};
use crate::error::{Result, ShelfError};
use crate::key::Key;
use crate::logging::prefix;
use crate::range::{self, KeyQuery, RangeEnd};
use crate::shelf::Shelf;

/// Keys produced by [`Shelf::set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stored {
    /// Key of a single record
    One(Key),
    /// Keys of a batch, in input order
    Many(Vec<Key>),
}

impl Stored {
    pub fn into_keys(self) -> Vec<Key> {
        match self {
            Stored::One(key) => vec![key],
            Stored::Many(keys) => keys,
        }
    }
}

/// Write one record, applying the store's key policy.
///
/// With a key path the value must be an object carrying that field. Without
/// one, a string `key` naming a field of the value takes the key from that
/// field; otherwise `key` itself is the record key.
async fn put_record<S: ObjectStore>(
    store: &S,
    key_path: Option<&str>,
    value: &Value,
    key: Option<&Value>,
) -> Result<Key> {
    if let Some(path) = key_path {
        let carries_key = value.as_object().is_some_and(|o| o.contains_key(path));
        if !carries_key {
            return Err(ShelfError::KeyPathMismatch {
                store: store.name(),
                key_path: path.to_string(),
            });
        }
        return store.put(value, None).await;
    }

    let explicit = match key {
        // The engine rejects key-less writes to out-of-line stores
        None => return store.put(value, None).await,
        Some(k) => k
            .as_str()
            .and_then(|field| value.as_object()?.get(field))
            .unwrap_or(k),
    };
    let key = Key::from_value(explicit)?;
    store.put(value, Some(&key)).await
}

impl<E: Engine> Shelf<E> {
    /// Fetch the record at primary key `key`.
    pub async fn get(&mut self, store: &str, key: &Key) -> Result<Option<Value>> {
        let result = self.get_in(store, key).await;
        self.connection.close();
        result
    }

    async fn get_in(&mut self, store: &str, key: &Key) -> Result<Option<Value>> {
        let db = self.open_for(store).await?;
        let tx = db.transaction(&[store], TransactionMode::ReadOnly)?;
        let object_store = tx.object_store(store)?;
        let value = object_store.get(key).await?;
        tx.done().await?;
        debug!(
            "{} get '{}' [{}]: {}",
            prefix::DB,
            store,
            key,
            if value.is_some() { "hit" } else { "miss" }
        );
        Ok(value)
    }

    /// Scan `index` of `store` in ascending index-key order.
    ///
    /// Without `start` every record the index covers is returned; otherwise only
    /// those inside the range `(start, end)` describes.
    pub async fn find(
        &mut self,
        store: &str,
        index: &str,
        start: Option<Key>,
        end: RangeEnd,
    ) -> Result<Vec<Value>> {
        let result = self.find_in(store, index, start, end).await;
        self.connection.close();
        result
    }

    async fn find_in(
        &mut self,
        store: &str,
        index: &str,
        start: Option<Key>,
        end: RangeEnd,
    ) -> Result<Vec<Value>> {
        let key_range = start.map(|s| range::translate(s, end)).transpose()?;
        let db = self.open_for(store).await?;
        let tx = db.transaction(&[store], TransactionMode::ReadOnly)?;
        let object_store = tx.object_store(store)?;
        let mut cursor = object_store
            .index(index)?
            .open_cursor(key_range.as_ref())
            .await?;

        let mut records = Vec::new();
        while let Some(value) = cursor.advance().await? {
            records.push(value);
        }
        tx.done().await?;
        debug!(
            "{} find '{}'.'{}' {:?}: {} record(s)",
            prefix::DB,
            store,
            index,
            key_range,
            records.len()
        );
        Ok(records)
    }

    /// Insert or overwrite records in `store`.
    ///
    /// A JSON array is a batch: elements are written one after another in one
    /// transaction and the keys come back in input order. A failing element
    /// stops the batch; elements before it stay written.
    pub async fn set(&mut self, store: &str, value: &Value, key: Option<&Value>) -> Result<Stored> {
        let result = self.set_in(store, value, key).await;
        self.connection.close();
        result
    }

    async fn set_in(&mut self, store: &str, value: &Value, key: Option<&Value>) -> Result<Stored> {
        let db = self.open_for(store).await?;
        let tx = db.transaction(&[store], TransactionMode::ReadWrite)?;
        let object_store = tx.object_store(store)?;
        let key_path = object_store.key_path();

        let stored = match value {
            Value::Array(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    keys.push(put_record(&object_store, key_path.as_deref(), item, key).await?);
                }
                debug!("{} set '{}': {} record(s)", prefix::DB, store, keys.len());
                Stored::Many(keys)
            }
            single => {
                let key = put_record(&object_store, key_path.as_deref(), single, key).await?;
                debug!("{} set '{}' [{}]", prefix::DB, store, key);
                Stored::One(key)
            }
        };
        tx.done().await?;
        Ok(stored)
    }

    /// Delete the record at `start`, or with `end` every record whose primary
    /// key falls in the range `(start, end)` describes.
    pub async fn del(
        &mut self,
        store: &str,
        start: Key,
        end: Option<RangeEnd>,
    ) -> Result<ReadyState> {
        let result = self.del_in(store, start, end).await;
        self.connection.close();
        result
    }

    async fn del_in(
        &mut self,
        store: &str,
        start: Key,
        end: Option<RangeEnd>,
    ) -> Result<ReadyState> {
        let query = match end {
            None => KeyQuery::Key(start),
            Some(end) => KeyQuery::Range(range::translate(start, end)?),
        };
        let db = self.open_for(store).await?;
        let tx = db.transaction(&[store], TransactionMode::ReadWrite)?;
        let state = tx.object_store(store)?.delete(&query).await?;
        tx.done().await?;
        debug!("{} del '{}' {:?}", prefix::DB, store, query);
        Ok(state)
    }

    /// Remove every record of `store`.
    pub async fn clear(&mut self, store: &str) -> Result<ReadyState> {
        let result = self.clear_in(store).await;
        self.connection.close();
        result
    }

    async fn clear_in(&mut self, store: &str) -> Result<ReadyState> {
        let db = self.open_for(store).await?;
        let tx = db.transaction(&[store], TransactionMode::ReadWrite)?;
        let state = tx.object_store(store)?.clear().await?;
        tx.done().await?;
        debug!("{} cleared '{}'", prefix::DB, store);
        Ok(state)
    }
}
