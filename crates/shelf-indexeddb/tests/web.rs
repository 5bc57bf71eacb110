//! Browser tests against the real IndexedDB
//!
//! Run with `wasm-pack test --headless --firefox crates/shelf-indexeddb`.

#![cfg(target_arch = "wasm32")]

use serde_json::json;
use shelf_core::{IndexSpec, Key, RangeEnd, ReadyState, Shelf, ShelfError, Stored};
use shelf_indexeddb::{IdbEngine, IndexedDb};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

async fn fresh_shelf(name: &str) -> Shelf<IdbEngine> {
    let mut shelf = Shelf::new(IdbEngine::new(), name);
    shelf.del_db().await.unwrap();
    shelf
}

#[wasm_bindgen_test]
fn test_engine_available() {
    let shelf = Shelf::new(IdbEngine::new(), "shelf-test-available");
    assert!(shelf.is_supported());
}

#[wasm_bindgen_test]
async fn test_add_store_and_has_store() {
    let mut shelf = fresh_shelf("shelf-test-schema").await;

    assert!(!shelf.has_store("people").await.unwrap());
    let indexes = IndexSpec::new().field("age", false);
    shelf
        .add_store("people", Some(indexes), false, Some("id"))
        .await
        .unwrap();
    assert!(shelf.has_store("people").await.unwrap());

    shelf.del_store("people").await.unwrap();
    assert!(!shelf.has_store("people").await.unwrap());
}

#[wasm_bindgen_test]
async fn test_records_round_trip() {
    let mut shelf = fresh_shelf("shelf-test-records").await;
    shelf
        .add_store("people", Some(IndexSpec::new().field("age", false)), false, Some("id"))
        .await
        .unwrap();

    let batch = json!([{"id": 3, "age": 40}, {"id": 1, "age": 10}, {"id": 2, "age": 25}]);
    let stored = shelf.set("people", &batch, None).await.unwrap();
    assert_eq!(
        stored,
        Stored::Many(vec![Key::from(3), Key::from(1), Key::from(2)])
    );

    let record = shelf.get("people", &Key::from(2)).await.unwrap();
    assert_eq!(record, Some(json!({"id": 2, "age": 25})));

    let found = shelf
        .find("people", "age", Some(Key::from(20)), RangeEnd::AtLeast)
        .await
        .unwrap();
    assert_eq!(found, vec![json!({"id": 2, "age": 25}), json!({"id": 3, "age": 40})]);

    let state = shelf.del("people", Key::from(3), None).await.unwrap();
    assert_eq!(state, ReadyState::Done);
    assert_eq!(shelf.get("people", &Key::from(3)).await.unwrap(), None);

    assert_eq!(shelf.clear("people").await.unwrap(), ReadyState::Done);
    let all = shelf
        .find("people", "age", None, RangeEnd::default())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[wasm_bindgen_test]
async fn test_key_path_mismatch() {
    let mut shelf = fresh_shelf("shelf-test-keypath").await;
    shelf.add_store("people", None, false, Some("id")).await.unwrap();

    let err = shelf
        .set("people", &json!({"name": "no id"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShelfError::KeyPathMismatch { .. }));
}

#[wasm_bindgen_test]
async fn test_missing_store() {
    let mut shelf = fresh_shelf("shelf-test-missing").await;
    let err = shelf.get("nope", &Key::from(1)).await.unwrap_err();
    assert!(err.is_store_not_found());
}

#[wasm_bindgen_test]
async fn test_unique_index_violation() {
    let mut shelf = fresh_shelf("shelf-test-unique").await;
    shelf
        .add_store("users", Some(IndexSpec::new().field("email", true)), false, Some("id"))
        .await
        .unwrap();

    shelf
        .set("users", &json!({"id": 1, "email": "a@b"}), None)
        .await
        .unwrap();
    let err = shelf
        .set("users", &json!({"id": 2, "email": "a@b"}), None)
        .await
        .unwrap_err();
    assert_eq!(err.engine_name(), Some("ConstraintError"));
}

#[wasm_bindgen_test]
async fn test_batch_keeps_writes_before_constraint_error() {
    let mut shelf = fresh_shelf("shelf-test-batch").await;
    shelf
        .add_store("users", Some(IndexSpec::new().field("email", true)), false, Some("id"))
        .await
        .unwrap();

    let batch = json!([{"id": 1, "email": "a@b"}, {"id": 2, "email": "a@b"}]);
    let err = shelf.set("users", &batch, None).await.unwrap_err();
    assert_eq!(err.engine_name(), Some("ConstraintError"));

    let first = shelf.get("users", &Key::from(1)).await.unwrap();
    assert_eq!(first, Some(json!({"id": 1, "email": "a@b"})));
    assert_eq!(shelf.get("users", &Key::from(2)).await.unwrap(), None);
}

#[wasm_bindgen_test]
async fn test_find_with_null_start_rejects() {
    let name = "shelf-test-null-start";
    Shelf::new(IdbEngine::new(), name).del_db().await.unwrap();

    let db = IndexedDb::new(JsValue::from_str(name)).unwrap();
    let indexes = js_sys::Object::new();
    js_sys::Reflect::set(&indexes, &"age".into(), &JsValue::FALSE).unwrap();
    JsFuture::from(db.add_store("people".into(), indexes.into(), None, Some("id".into())))
        .await
        .unwrap();

    let all = JsFuture::from(db.find(
        "people".into(),
        "age".into(),
        JsValue::UNDEFINED,
        JsValue::UNDEFINED,
    ))
    .await
    .unwrap();
    assert!(js_sys::Array::is_array(&all));

    let err = JsFuture::from(db.find(
        "people".into(),
        "age".into(),
        JsValue::NULL,
        JsValue::UNDEFINED,
    ))
    .await
    .unwrap_err();
    let kind = js_sys::Reflect::get(&err, &"name".into()).unwrap();
    assert_eq!(kind.as_string().as_deref(), Some("InvalidArgumentError"));
}
