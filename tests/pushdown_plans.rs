//! Pushdown Split Tests
//!
//! The split of a chain into a remote document and a local suffix:
//! - the remote part is the longest representable prefix
//! - predicate filters, aggregates and maps never cross
//! - the policy presets move the boundary as documented
//! - the wire document nests predecessors under `inner`

use std::sync::Arc;

use entiq::query::{EntityStore, PushdownPolicy, RequestContext};
use entiq::remote::{MemoryChannel, RemoteQuery, SortKey};
use entiq::types::{EntityDescriptor, FieldDescriptor, FieldKind, TypeRegistry};
use entiq::value::Value;
use serde_json::json;

fn store(policy: PushdownPolicy) -> (EntityStore, Arc<MemoryChannel>) {
    let registry = TypeRegistry::new()
        .with(EntityDescriptor::new(
            "Foo",
            vec![
                FieldDescriptor::required("status", FieldKind::String),
                FieldDescriptor::optional("rank", FieldKind::Number),
            ],
        ))
        .unwrap()
        .into_shared()
        .unwrap();
    let channel = Arc::new(MemoryChannel::new().with_rows(
        "Foo",
        vec![
            json!({"id": "1", "status": "active", "rank": 3}),
            json!({"id": "2", "status": "idle", "rank": 1}),
        ],
    ));
    (EntityStore::new(channel.clone(), registry).with_policy(policy), channel)
}

fn kinds(query: &RemoteQuery) -> Vec<&'static str> {
    query.nodes().iter().map(|n| n.kind()).collect()
}

#[test]
fn test_wire_document_for_filter_take() {
    let (store, _) = store(PushdownPolicy::default());
    let plan = store
        .cursor("Foo")
        .filter_json(&json!({"status": "active"}))
        .unwrap()
        .take(2)
        .explain()
        .unwrap();

    assert!(plan.local.is_empty());
    assert_eq!(
        serde_json::to_value(plan.remote.unwrap()).unwrap(),
        json!({
            "type": "Take",
            "count": 2,
            "inner": {
                "type": "ExpressionFilter",
                "expression": {
                    "exprType": "Binary",
                    "left": {
                        "exprType": "Property",
                        "object": {"exprType": "Parameter", "position": 0},
                        "property": "status"
                    },
                    "op": "Eq",
                    "right": {"exprType": "Value", "value": "active"}
                },
                "inner": {"type": "BaseEntity", "name": "Foo"}
            }
        })
    );
}

#[test]
fn test_predicate_filter_stops_pushdown() {
    let (store, _) = store(PushdownPolicy::default());
    let plan = store
        .cursor("Foo")
        .skip(1)
        .filter(|_: &Value| Ok(true))
        .take(5)
        .explain()
        .unwrap();

    assert_eq!(kinds(plan.remote.as_ref().unwrap()), vec!["BaseEntity", "Skip"]);
    let local: Vec<_> = plan.local.iter().map(|op| op.describe()).collect();
    assert_eq!(local, vec!["PredicateFilter", "Take(5)"]);
}

#[test]
fn test_aggregate_and_map_stay_local() {
    let (store, _) = store(PushdownPolicy::default());
    let plan = store
        .cursor("Foo")
        .select(["rank"])
        .max_by("rank")
        .map(|v: Value| Ok(v))
        .explain()
        .unwrap();

    assert_eq!(
        kinds(plan.remote.as_ref().unwrap()),
        vec!["BaseEntity", "ColumnsSelect"]
    );
    assert!(plan.is_projected());
    let local: Vec<_> = plan.local.iter().map(|op| op.describe()).collect();
    assert_eq!(local, vec!["MaxBy(rank)", "Map"]);
}

#[test]
fn test_policy_presets() {
    let chain = |store: &EntityStore| {
        store
            .cursor("Foo")
            .sort_by([SortKey::desc("rank")])
            .take(1)
            .select(["id"])
    };

    let (default, _) = store(PushdownPolicy::default());
    let plan = chain(&default).explain().unwrap();
    assert_eq!(
        kinds(plan.remote.as_ref().unwrap()),
        vec!["BaseEntity", "SortBy", "Take", "ColumnsSelect"]
    );

    let (until_take, _) = store(PushdownPolicy::until_take());
    let plan = chain(&until_take).explain().unwrap();
    assert_eq!(
        kinds(plan.remote.as_ref().unwrap()),
        vec!["BaseEntity", "SortBy", "Take"]
    );
    assert_eq!(plan.local.len(), 1);

    let (scan_only, _) = store(PushdownPolicy::scan_only());
    let plan = chain(&scan_only).explain().unwrap();
    assert_eq!(kinds(plan.remote.as_ref().unwrap()), vec!["BaseEntity"]);
    assert_eq!(plan.local.len(), 3);
}

#[test]
fn test_zero_take_plan_keeps_suffix() {
    let (store, _) = store(PushdownPolicy::default());
    let plan = store
        .cursor("Foo")
        .take(3)
        .take(0)
        .sort_by([SortKey::asc("id")])
        .explain()
        .unwrap();

    assert!(plan.short_circuit);
    assert!(plan.remote.is_none());
    let doc = plan.to_json();
    assert_eq!(doc["entity"], "Foo");
    assert_eq!(doc["remote"], serde_json::Value::Null);
    assert_eq!(doc["local"], json!(["SortBy(id asc)"]));
}

#[test]
fn test_empty_filter_document_adds_no_node() {
    let (store, _) = store(PushdownPolicy::default());
    let base = store.cursor("Foo");
    assert_eq!(base.filter_json(&json!({})).unwrap().node_count(), 1);
    assert_eq!(
        base.filter_json(&json!({"$and": []})).unwrap().node_count(),
        1
    );
}

#[tokio::test]
async fn test_opened_document_matches_explain() {
    let (store, channel) = store(PushdownPolicy::default());
    let cursor = store
        .cursor("Foo")
        .filter_json(&json!({"rank": {"$gte": 2}}))
        .unwrap()
        .sort_by([SortKey::asc("rank")]);

    let expected = cursor.explain().unwrap().remote;
    let out = cursor.to_array(&RequestContext::internal()).await.unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(channel.opened_queries(), vec![expected.unwrap()]);
}
