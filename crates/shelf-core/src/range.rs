//! Key ranges and the `(start, end)` range translation used by `find` and `del`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShelfError};
use crate::key::Key;

/// One end of a [`KeyRange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub key: Key,
    /// Excludes `key` itself when true
    pub open: bool,
}

/// Contiguous interval of keys, the engine's native range primitive.
///
/// A missing bound means the range is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl KeyRange {
    /// Range matching exactly `key`.
    pub fn only(key: Key) -> Self {
        Self {
            lower: Some(Bound {
                key: key.clone(),
                open: false,
            }),
            upper: Some(Bound { key, open: false }),
        }
    }

    /// Keys at least `key` (greater than, when `open`).
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Some(Bound { key, open }),
            upper: None,
        }
    }

    /// Keys at most `key` (less than, when `open`).
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(Bound { key, open }),
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// Fails when `lower > upper`, or when both are equal and either end is open.
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> Result<Self> {
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(ShelfError::InvalidArgument(format!(
                "lower bound {} is greater than upper bound {}",
                lower, upper
            )));
        }
        Ok(Self {
            lower: Some(Bound {
                key: lower,
                open: lower_open,
            }),
            upper: Some(Bound {
                key: upper,
                open: upper_open,
            }),
        })
    }

    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            Some(b) if b.open => key > &b.key,
            Some(b) => key >= &b.key,
            None => true,
        };
        let below_upper = match &self.upper {
            Some(b) if b.open => key < &b.key,
            Some(b) => key <= &b.key,
            None => true,
        };
        above_lower && below_upper
    }
}

/// How the second argument of a scan or ranged delete bounds the interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeEnd {
    /// Everything at most `start`
    #[default]
    AtMost,
    /// Everything at least `start`
    AtLeast,
    /// From `start` through this key, inclusive
    Through(Key),
}

impl From<bool> for RangeEnd {
    fn from(upper: bool) -> Self {
        if upper {
            RangeEnd::AtMost
        } else {
            RangeEnd::AtLeast
        }
    }
}

impl From<Key> for RangeEnd {
    fn from(key: Key) -> Self {
        RangeEnd::Through(key)
    }
}

/// Translate a `(start, end)` query description into a [`KeyRange`].
///
/// - `AtMost`: upper bound `start`
/// - `AtLeast`: lower bound `start`
/// - `Through(k)` with `k == start`: the single key `start`
/// - `Through(k)` otherwise: closed interval `[start, k]`
pub fn translate(start: Key, end: RangeEnd) -> Result<KeyRange> {
    match end {
        RangeEnd::AtMost => Ok(KeyRange::upper_bound(start, false)),
        RangeEnd::AtLeast => Ok(KeyRange::lower_bound(start, false)),
        RangeEnd::Through(end) if end == start => Ok(KeyRange::only(start)),
        RangeEnd::Through(end) => KeyRange::bound(start, end, false, false),
    }
}

/// Target of a delete: one primary key or every key in a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    Key(Key),
    Range(KeyRange),
}

impl KeyQuery {
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            KeyQuery::Key(k) => k == key,
            KeyQuery::Range(range) => range.contains(key),
        }
    }
}
