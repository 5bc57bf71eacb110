//! Error conversion at the JavaScript boundary

use shelf_core::ShelfError;
use wasm_bindgen::{JsCast, JsValue};

/// Convert a thrown JS value or DOMException into an engine error.
///
/// The DOMException name (`DataError`, `VersionError`, ...) is kept so callers
/// can tell engine failures apart.
pub fn engine_error(val: JsValue) -> ShelfError {
    if let Some(dom) = val.dyn_ref::<web_sys::DomException>() {
        return ShelfError::engine(dom.name(), dom.message());
    }
    if let Some(err) = val.dyn_ref::<js_sys::Error>() {
        return ShelfError::engine(String::from(err.name()), String::from(err.message()));
    }
    let msg = val.as_string().unwrap_or_else(|| {
        js_sys::JSON::stringify(&val)
            .map(String::from)
            .unwrap_or_else(|_| format!("{:?}", val))
    });
    ShelfError::engine("UnknownError", msg)
}

/// Convert a shelf error into a JS `Error` whose `name` is the error kind.
pub fn to_js_error(err: ShelfError) -> JsValue {
    let js_err = js_sys::Error::new(&err.to_string());
    js_err.set_name(err.kind());
    js_err.into()
}
