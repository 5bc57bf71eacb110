//! JS <-> shelf value conversion
//!
//! Records cross the boundary as JSON: structured-clone types without a JSON
//! form (Date, Blob, Map...) are not supported as record values.

use serde_json::Value;
use shelf_core::{Key, KeyRange, RangeEnd, Result, ShelfError};
use wasm_bindgen::JsValue;
use web_sys::IdbKeyRange;

use crate::error::engine_error;

/// Convert a JSON value to a JS value.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let json = serde_json::to_string(value)?;
    js_sys::JSON::parse(&json).map_err(engine_error)
}

/// Convert a JS value to JSON. `undefined` becomes `None`.
pub fn js_to_value(val: &JsValue) -> Result<Option<Value>> {
    if val.is_undefined() {
        return Ok(None);
    }
    let json = js_sys::JSON::stringify(val).map_err(engine_error)?;
    match json.as_string() {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Err(ShelfError::Serialization(
            "value has no JSON representation".into(),
        )),
    }
}

/// Convert a key to its native JS form.
pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::String(s) => JsValue::from_str(s),
        Key::Array(items) => items
            .iter()
            .map(key_to_js)
            .collect::<js_sys::Array>()
            .into(),
    }
}

/// Convert a native JS key (number, string, array of keys) to a [`Key`].
pub fn js_to_key(val: &JsValue) -> Result<Key> {
    if let Some(n) = val.as_f64() {
        if n.is_nan() {
            return Err(ShelfError::InvalidArgument("NaN is not a valid key".into()));
        }
        return Ok(Key::Number(n));
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::String(s));
    }
    if js_sys::Array::is_array(val) {
        let array = js_sys::Array::from(val);
        return array
            .iter()
            .map(|item| js_to_key(&item))
            .collect::<Result<Vec<_>>>()
            .map(Key::Array);
    }
    Err(ShelfError::InvalidArgument(format!(
        "{:?} is not a valid key",
        val
    )))
}

/// Build the engine's native range object. Fully unbounded ranges give `None`.
pub fn range_to_js(range: &KeyRange) -> Result<Option<IdbKeyRange>> {
    let native = match (&range.lower, &range.upper) {
        (None, None) => return Ok(None),
        (Some(lo), Some(hi)) if lo.key == hi.key && !lo.open && !hi.open => {
            IdbKeyRange::only(&key_to_js(&lo.key))
        }
        (Some(lo), Some(hi)) => IdbKeyRange::bound_with_lower_open_and_upper_open(
            &key_to_js(&lo.key),
            &key_to_js(&hi.key),
            lo.open,
            hi.open,
        ),
        (Some(lo), None) => IdbKeyRange::lower_bound_with_open(&key_to_js(&lo.key), lo.open),
        (None, Some(hi)) => IdbKeyRange::upper_bound_with_open(&key_to_js(&hi.key), hi.open),
    };
    native.map(Some).map_err(engine_error)
}

/// Interpret the JS `end` argument of `find`/`del`: `undefined` or a boolean
/// selects a half-open range, anything else is the closing key.
pub fn js_to_range_end(val: &JsValue) -> Result<RangeEnd> {
    if val.is_undefined() {
        return Ok(RangeEnd::default());
    }
    match val.as_bool() {
        Some(upper) => Ok(RangeEnd::from(upper)),
        None => js_to_key(val).map(RangeEnd::Through),
    }
}
