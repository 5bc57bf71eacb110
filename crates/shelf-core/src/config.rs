//! Shelf configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default database name
pub const DEFAULT_DATABASE: &str = "shelf";

/// Configuration for a [`Shelf`](crate::Shelf) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    /// Database name
    pub database: String,
    /// Known current database version. When unset, the first open asks the engine.
    pub initial_version: Option<u64>,
    /// Check that a record operation's store exists before starting its transaction
    pub validate_stores: bool,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            initial_version: None,
            validate_stores: true,
        }
    }
}

impl ShelfConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn initial_version(mut self, version: u64) -> Self {
        self.initial_version = Some(version);
        self
    }

    pub fn validate_stores(mut self, validate: bool) -> Self {
        self.validate_stores = validate;
        self
    }
}
