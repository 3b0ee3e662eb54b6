//! Structured Logging Tests
//!
//! One cursor iteration emits, in order: the iteration scope begin, the
//! split decision, the remote open and close, then the scope completion.
//! Kept to a single test: the logger threshold and capture buffer are
//! process-wide.

use std::sync::Arc;

use entiq::observability::{Logger, Severity};
use entiq::query::{EntityStore, RequestContext};
use entiq::remote::MemoryChannel;
use entiq::types::{EntityDescriptor, FieldDescriptor, FieldKind, TypeRegistry};
use serde_json::{json, Value as JsonValue};

fn events(lines: &[String]) -> Vec<JsonValue> {
    lines
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn names(parsed: &[JsonValue]) -> Vec<&str> {
    parsed
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_iteration_lifecycle_events() {
    let registry = TypeRegistry::new()
        .with(EntityDescriptor::new(
            "Foo",
            vec![FieldDescriptor::required("n", FieldKind::Number)],
        ))
        .unwrap()
        .into_shared()
        .unwrap();
    let channel = Arc::new(MemoryChannel::new().with_rows(
        "Foo",
        vec![json!({"id": "1", "n": 1}), json!({"id": "2", "n": "two"})],
    ));
    let store = EntityStore::new(channel, registry);
    let ctx = RequestContext::internal();

    Logger::set_threshold(Severity::Trace);
    Logger::capture();

    let rows = store.cursor("Foo").take(1).to_array(&ctx).await.unwrap();
    assert_eq!(rows.len(), 1);

    let parsed = events(&Logger::take_captured());
    assert_eq!(
        names(&parsed),
        vec![
            "CURSOR_ITERATION_BEGIN",
            "QUERY_SPLIT",
            "REMOTE_OPEN",
            "REMOTE_CLOSE",
            "CURSOR_ITERATION_COMPLETE",
        ]
    );
    let request_id = ctx.request_id.to_string();
    assert_eq!(parsed[0]["request_id"], request_id.as_str());
    assert_eq!(parsed[0]["terminal"], "to_array");
    assert_eq!(parsed[1]["severity"], "TRACE");
    assert_eq!(parsed[1]["short_circuit"], "false");
    assert_eq!(parsed[4]["rows"], "1");

    // A type mismatch fails the iteration at ERROR
    Logger::capture();
    let err = store.cursor("Foo").to_array(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "ENTIQ_TYPE_MISMATCH");

    let parsed = events(&Logger::take_captured());
    let failed = parsed
        .iter()
        .find(|e| e["event"] == "CURSOR_ITERATION_FAILED")
        .unwrap();
    assert_eq!(failed["severity"], "ERROR");
    assert!(failed["reason"].as_str().unwrap().contains("Foo.n"));
    assert!(names(&parsed).contains(&"REMOTE_CLOSE"));

    // Below the threshold nothing is written
    Logger::set_threshold(Severity::Warn);
    Logger::capture();
    store.cursor("Foo").take(0).count(&ctx).await.unwrap();
    assert!(Logger::take_captured().is_empty());
}
