//! Record operation tests for Shelf over the memory engine

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use shelf_core::{IndexSpec, Key, MemoryEngine, RangeEnd, ReadyState, Shelf, ShelfError, Stored};

const DB: &str = "records";

/// Shelf with a `people` store keyed by `id`, indexed on `age` and unique `email`,
/// and a key-less `kv` store.
async fn create_shelf(engine: &MemoryEngine) -> Shelf<MemoryEngine> {
    let mut shelf = Shelf::new(engine.clone(), DB);
    let indexes = IndexSpec::new().field("age", false).field("email", true);
    shelf
        .add_store("people", Some(indexes), false, Some("id"))
        .await
        .unwrap();
    shelf
        .add_store("kv", Some(IndexSpec::new().field("n", false)), false, None)
        .await
        .unwrap();
    shelf
}

fn person(id: i64, age: i64) -> Value {
    json!({"id": id, "age": age, "email": format!("p{}@example.com", id)})
}

#[tokio::test]
async fn test_set_and_get_round_trip() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let record = json!({"id": 7, "age": 33, "email": "x@y", "tags": ["a", {"b": null}]});
    let stored = shelf.set("people", &record, None).await.unwrap();
    assert_eq!(stored, Stored::One(Key::from(7)));

    let retrieved = shelf.get("people", &Key::from(7)).await.unwrap();
    assert_eq!(retrieved, Some(record));
}

#[tokio::test]
async fn test_get_missing_key() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    assert_eq!(shelf.get("people", &Key::from(404)).await.unwrap(), None);
}

#[tokio::test]
async fn test_get_missing_store() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf.get("nope", &Key::from(1)).await.unwrap_err();
    assert_eq!(err, ShelfError::StoreNotFound("nope".into()));
}

#[tokio::test]
async fn test_set_without_key_path_field_is_mismatch() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let err = shelf
        .set("people", &json!({"age": 3}), Some(&json!(1)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ShelfError::KeyPathMismatch {
            store: "people".into(),
            key_path: "id".into()
        }
    );

    let err = shelf.set("people", &json!("scalar"), None).await.unwrap_err();
    assert_eq!(err.kind(), "KeyPathMismatchError");
}

#[tokio::test]
async fn test_set_key_path_ignores_external_key() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let stored = shelf
        .set("people", &person(3, 20), Some(&json!(999)))
        .await
        .unwrap();
    assert_eq!(stored, Stored::One(Key::from(3)));
    assert_eq!(shelf.get("people", &Key::from(999)).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_key_from_named_field() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let stored = shelf
        .set("kv", &json!({"slug": "intro", "n": 1}), Some(&json!("slug")))
        .await
        .unwrap();
    assert_eq!(stored, Stored::One(Key::from("intro")));

    // A string key that names no field is the key itself
    let stored = shelf
        .set("kv", &json!({"n": 2}), Some(&json!("slug")))
        .await
        .unwrap();
    assert_eq!(stored, Stored::One(Key::from("slug")));

    // Scalars use the explicit key
    let stored = shelf.set("kv", &json!(42), Some(&json!([1, 2]))).await.unwrap();
    assert_eq!(
        stored,
        Stored::One(Key::Array(vec![Key::from(1), Key::from(2)]))
    );
}

#[tokio::test]
async fn test_set_invalid_explicit_key() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf
        .set("kv", &json!("v"), Some(&json!(true)))
        .await
        .unwrap_err();
    assert!(matches!(err, ShelfError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_set_without_any_key_fails_in_engine() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf.set("kv", &json!("v"), None).await.unwrap_err();
    assert_eq!(err.engine_name(), Some("DataError"));
}

#[tokio::test]
async fn test_batch_set_keys_in_input_order() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch = json!([person(30, 1), person(10, 2), person(20, 3)]);
    let stored = shelf.set("people", &batch, None).await.unwrap();
    assert_eq!(
        stored,
        Stored::Many(vec![Key::from(30), Key::from(10), Key::from(20)])
    );
}

#[tokio::test]
async fn test_batch_set_stops_at_failing_element() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch = json!([person(1, 1), {"age": 2}, person(3, 3)]);
    let err = shelf.set("people", &batch, None).await.unwrap_err();
    assert!(matches!(err, ShelfError::KeyPathMismatch { .. }));

    // Earlier writes stay, later ones never happen
    assert!(shelf.get("people", &Key::from(1)).await.unwrap().is_some());
    assert!(shelf.get("people", &Key::from(3)).await.unwrap().is_none());
    assert_eq!(engine.record_count(DB, "people"), 1);
}

#[tokio::test]
async fn test_batch_keeps_writes_before_engine_failure() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch = json!([
        {"id": 1, "email": "dup@example.com"},
        {"id": 2, "email": "dup@example.com"},
        {"id": 3, "email": "other@example.com"}
    ]);
    let err = shelf.set("people", &batch, None).await.unwrap_err();
    assert_eq!(err.engine_name(), Some("ConstraintError"));

    assert_eq!(
        shelf.get("people", &Key::from(1)).await.unwrap(),
        Some(json!({"id": 1, "email": "dup@example.com"}))
    );
    assert_eq!(shelf.get("people", &Key::from(2)).await.unwrap(), None);
    assert_eq!(shelf.get("people", &Key::from(3)).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_batch() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let stored = shelf.set("people", &json!([]), None).await.unwrap();
    assert_eq!(stored, Stored::Many(vec![]));
}

#[tokio::test]
async fn test_unique_index_violation_surfaces_engine_error() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    shelf
        .set("people", &json!({"id": 1, "email": "same"}), None)
        .await
        .unwrap();
    let err = shelf
        .set("people", &json!({"id": 2, "email": "same"}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "EngineOperationError");
    assert_eq!(err.engine_name(), Some("ConstraintError"));
}

#[tokio::test]
async fn test_find_all_in_index_order() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch = json!([person(1, 40), person(2, 10), person(3, 25), {"id": 4}]);
    shelf.set("people", &batch, None).await.unwrap();

    let found = shelf
        .find("people", "age", None, RangeEnd::default())
        .await
        .unwrap();
    let ids: Vec<i64> = found.iter().map(|v| v["id"].as_i64().unwrap()).collect();
    // Record 4 has no age and is not in the index
    assert_eq!(ids, vec![2, 3, 1]);
}

#[tokio::test]
async fn test_find_ranges() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch: Vec<Value> = (1..=12).map(|age| person(100 + age, age)).collect();
    shelf.set("people", &Value::Array(batch), None).await.unwrap();

    let ages = |found: Vec<Value>| -> Vec<i64> {
        found.iter().map(|v| v["age"].as_i64().unwrap()).collect()
    };

    let found = shelf
        .find("people", "age", Some(Key::from(5)), Key::from(10).into())
        .await
        .unwrap();
    assert_eq!(ages(found), vec![5, 6, 7, 8, 9, 10]);

    let found = shelf
        .find("people", "age", Some(Key::from(3)), RangeEnd::AtMost)
        .await
        .unwrap();
    assert_eq!(ages(found), vec![1, 2, 3]);

    let found = shelf
        .find("people", "age", Some(Key::from(11)), RangeEnd::AtLeast)
        .await
        .unwrap();
    assert_eq!(ages(found), vec![11, 12]);

    let found = shelf
        .find("people", "age", Some(Key::from(7)), Key::from(7).into())
        .await
        .unwrap();
    assert_eq!(ages(found), vec![7]);
}

#[tokio::test]
async fn test_find_no_matches_is_empty() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let found = shelf
        .find("people", "age", Some(Key::from(1000)), RangeEnd::AtLeast)
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_find_missing_index() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf
        .find("people", "height", None, RangeEnd::default())
        .await
        .unwrap_err();
    assert_eq!(err.engine_name(), Some("NotFoundError"));
    assert_eq!(engine.live_connections(DB), 0);
}

#[tokio::test]
async fn test_find_inverted_range() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf
        .find("people", "age", Some(Key::from(10)), Key::from(5).into())
        .await
        .unwrap_err();
    assert!(matches!(err, ShelfError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_del_single_then_get() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    shelf.set("people", &person(1, 1), None).await.unwrap();
    let state = shelf.del("people", Key::from(1), None).await.unwrap();
    assert_eq!(state, ReadyState::Done);
    assert_eq!(shelf.get("people", &Key::from(1)).await.unwrap(), None);

    // Deleting an absent key still completes
    let state = shelf.del("people", Key::from(1), None).await.unwrap();
    assert_eq!(state, ReadyState::Done);
}

#[tokio::test]
async fn test_del_ranges() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    let batch: Vec<Value> = (1..=10).map(|id| person(id, id)).collect();
    shelf.set("people", &Value::Array(batch), None).await.unwrap();

    shelf
        .del("people", Key::from(3), Some(Key::from(5).into()))
        .await
        .unwrap();
    assert_eq!(engine.record_count(DB, "people"), 7);

    shelf
        .del("people", Key::from(9), Some(RangeEnd::AtLeast))
        .await
        .unwrap();
    shelf
        .del("people", Key::from(1), Some(RangeEnd::AtMost))
        .await
        .unwrap();

    let remaining = shelf
        .find("people", "age", None, RangeEnd::default())
        .await
        .unwrap();
    let ids: Vec<i64> = remaining.iter().map(|v| v["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 6, 7, 8]);
}

#[tokio::test]
async fn test_clear() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;

    shelf
        .set("kv", &json!(["a", "b", "c"]), Some(&json!(1)))
        .await
        .unwrap();
    shelf.set("kv", &json!("z"), Some(&json!(2))).await.unwrap();

    assert_eq!(shelf.clear("kv").await.unwrap(), ReadyState::Done);
    assert_eq!(engine.record_count(DB, "kv"), 0);
    assert!(shelf.has_store("kv").await.unwrap());
}

#[tokio::test]
async fn test_clear_missing_store() {
    let engine = MemoryEngine::new();
    let mut shelf = create_shelf(&engine).await;
    let err = shelf.clear("nope").await.unwrap_err();
    assert!(err.is_store_not_found());
}
