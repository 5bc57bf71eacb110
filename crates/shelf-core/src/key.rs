//! Engine keys
//!
//! A [`Key`] is anything the engine can order records by: a number, a string, or
//! an array of keys. Ordering follows the object store rules: every number sorts
//! before every string, every string before every array, and arrays compare
//! element-wise with the shorter prefix first.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ShelfError};

/// Ordered primary or index key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Convert a JSON value into a key.
    ///
    /// `null`, booleans, objects and non-finite numbers are not valid keys.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|f| !f.is_nan())
                .map(Key::Number)
                .ok_or_else(|| ShelfError::InvalidArgument(format!("{} is not a valid key", n))),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Key::Array),
            other => Err(ShelfError::InvalidArgument(format!(
                "{} is not a valid key",
                other
            ))),
        }
    }

    /// Convert back into the JSON value the key was built from.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::from(*n as i64)
                } else {
                    Value::from(*n)
                }
            }
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // partial_cmp treats -0.0 and 0.0 as equal; NaN never gets past from_value
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl TryFrom<&Value> for Key {
    type Error = ShelfError;

    fn try_from(value: &Value) -> Result<Self> {
        Key::from_value(value)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

/// Read a top-level field of an object value as a key.
///
/// Returns `None` when `value` is not an object or the field is absent.
pub fn field_key(value: &Value, field: &str) -> Option<Result<Key>> {
    value.as_object()?.get(field).map(Key::from_value)
}
