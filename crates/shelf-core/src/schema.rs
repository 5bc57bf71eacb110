//! Schema mutation through version-change upgrades
//!
//! Stores and indexes can only change inside an upgrade, so `add_store` and
//! `del_store` reopen the database one version up and do their work in the
//! upgrade hook.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::engine::{Engine, UpgradeFn, VersionChange};
use crate::error::{Result, ShelfError};
use crate::logging::prefix;
use crate::shelf::Shelf;

/// Secondary indexes to create with a store: field name to uniqueness.
///
/// Each index is named after the field it covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    fields: BTreeMap<String, bool>,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an index on `field`.
    pub fn field(mut self, field: impl Into<String>, unique: bool) -> Self {
        self.fields.insert(field.into(), unique);
        self
    }

    /// Read a spec from a JSON value.
    ///
    /// Only a plain object counts; arrays, null and scalars give an empty spec.
    /// Each member's uniqueness is the truthiness of its value.
    pub fn from_json(value: &Value) -> Self {
        let fields = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .map(|(field, unique)| (field.clone(), truthy(unique)))
                    .collect()
            })
            .unwrap_or_default();
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.fields.iter().map(|(f, u)| (f.as_str(), *u))
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Upgrade step for `add_store`.
fn add_store_upgrade(
    vc: &mut dyn VersionChange,
    store: &str,
    indexes: &IndexSpec,
    replace: bool,
    key_path: Option<&str>,
) -> Result<()> {
    if vc.contains_store(store) {
        if !replace {
            debug!("{} store '{}' exists, leaving it untouched", prefix::DB, store);
            return Ok(());
        }
        vc.delete_store(store)?;
        info!("{} dropped store '{}' for replacement", prefix::DB, store);
    }
    vc.create_store(store, key_path)?;
    for (field, unique) in indexes.iter() {
        vc.create_index(store, field, field, unique)?;
    }
    info!(
        "{} created store '{}' (v{} -> v{}, keyPath {:?}, {} index(es))",
        prefix::DB,
        store,
        vc.old_version(),
        vc.new_version(),
        key_path,
        indexes.fields.len()
    );
    Ok(())
}

impl<E: Engine> Shelf<E> {
    /// Create `store` with `indexes`.
    ///
    /// An existing store is left untouched unless `replace` is set, in which case
    /// it is dropped (records included) and recreated. `key_path` makes the store
    /// use in-line keys read from that field. Resolves with the upgraded
    /// connection, which stays open.
    pub async fn add_store(
        &mut self,
        store: &str,
        indexes: Option<IndexSpec>,
        replace: bool,
        key_path: Option<&str>,
    ) -> Result<&E::Database> {
        if store.is_empty() {
            return Err(ShelfError::InvalidArgument(
                "store name can't be empty".to_string(),
            ));
        }
        let name = store.to_string();
        let indexes = indexes.unwrap_or_default();
        let key_path = key_path.filter(|p| !p.is_empty()).map(str::to_string);
        let upgrade: UpgradeFn = Box::new(move |vc: &mut dyn VersionChange| {
            add_store_upgrade(vc, &name, &indexes, replace, key_path.as_deref())
        });
        self.connection.reopen(Some(upgrade)).await?;
        self.connection.current()
    }

    /// Drop `store` if it exists. Resolves with the upgraded connection.
    pub async fn del_store(&mut self, store: &str) -> Result<&E::Database> {
        let name = store.to_string();
        let upgrade: UpgradeFn = Box::new(move |vc: &mut dyn VersionChange| {
            if vc.contains_store(&name) {
                vc.delete_store(&name)?;
                info!("{} deleted store '{}'", prefix::DB, name);
            }
            Ok(())
        });
        self.connection.reopen(Some(upgrade)).await?;
        self.connection.current()
    }
}
