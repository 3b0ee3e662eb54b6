//! Query scripts: a JSON description of a cursor chain and its terminal
//!
//! ```json
//! {
//!   "entity": "Person",
//!   "steps": [
//!     {"filter": {"age": {"$gte": 18}}},
//!     {"sortBy": [{"fieldName": "name", "ascending": true}]},
//!     {"take": 10}
//!   ],
//!   "terminal": "toArray"
//! }
//! ```
//!
//! Terminals: `"toArray"` (default), `"first"`, `"count"`, `{"min": field}`,
//! `{"max": field}`.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::query::{Cursor, EntityStore, QueryResult, RequestContext};
use crate::remote::SortKey;

/// One builder call on the cursor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Select(Vec<String>),
    Take(u64),
    Skip(u64),
    /// Filter document, compiled to an expression
    Filter(JsonValue),
    SortBy(Vec<SortKey>),
    MinBy(String),
    MaxBy(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Terminal {
    #[default]
    ToArray,
    First,
    Count,
    Min(String),
    Max(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryScript {
    pub entity: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub terminal: Terminal,
}

impl QueryScript {
    /// Applies every step, in order, to a fresh cursor over `entity`
    pub fn build(&self, store: &EntityStore) -> QueryResult<Cursor> {
        let mut cursor = store.cursor(self.entity.as_str());
        for step in &self.steps {
            cursor = match step {
                Step::Select(columns) => cursor.select(columns.iter().cloned()),
                Step::Take(count) => cursor.take(*count),
                Step::Skip(count) => cursor.skip(*count),
                Step::Filter(document) => cursor.filter_json(document)?,
                Step::SortBy(keys) => cursor.sort_by(keys.iter().cloned()),
                Step::MinBy(field) => cursor.min_by(field.as_str()),
                Step::MaxBy(field) => cursor.max_by(field.as_str()),
            };
        }
        Ok(cursor)
    }

    /// Runs the terminal and renders its result as JSON
    pub async fn evaluate(&self, store: &EntityStore, ctx: &RequestContext) -> QueryResult<JsonValue> {
        let cursor = self.build(store)?;
        let result = match &self.terminal {
            Terminal::ToArray => {
                let items = cursor.to_array(ctx).await?;
                JsonValue::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Terminal::First => optional(cursor.first(ctx).await?),
            Terminal::Count => json!(cursor.count(ctx).await?),
            Terminal::Min(field) => optional(cursor.min(field, ctx).await?),
            Terminal::Max(field) => optional(cursor.max(field, ctx).await?),
        };
        Ok(result)
    }
}

fn optional(value: Option<crate::value::Value>) -> JsonValue {
    value.map(|v| v.to_json()).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryChannel;
    use crate::types::{EntityDescriptor, FieldDescriptor, FieldKind, TypeRegistry};
    use std::sync::Arc;

    fn store() -> (EntityStore, Arc<MemoryChannel>) {
        let registry = TypeRegistry::new()
            .with(EntityDescriptor::new(
                "Task",
                vec![
                    FieldDescriptor::required("title", FieldKind::String),
                    FieldDescriptor::optional("priority", FieldKind::Number),
                ],
            ))
            .unwrap()
            .into_shared()
            .unwrap();
        let channel = Arc::new(MemoryChannel::new().with_rows(
            "Task",
            vec![
                json!({"id": "1", "title": "write", "priority": 3}),
                json!({"id": "2", "title": "test", "priority": 1}),
                json!({"id": "3", "title": "ship", "priority": null}),
            ],
        ));
        (EntityStore::new(channel.clone(), registry), channel)
    }

    fn script(document: JsonValue) -> QueryScript {
        serde_json::from_value(document).unwrap()
    }

    #[test]
    fn test_parse_defaults_to_array() {
        let parsed = script(json!({"entity": "Task"}));
        assert!(parsed.steps.is_empty());
        assert!(matches!(parsed.terminal, Terminal::ToArray));

        let parsed = script(json!({"entity": "Task", "terminal": {"min": "priority"}}));
        assert!(matches!(parsed.terminal, Terminal::Min(ref f) if f == "priority"));
    }

    #[test]
    fn test_unknown_step_rejected() {
        let result: Result<QueryScript, _> =
            serde_json::from_value(json!({"entity": "Task", "steps": [{"groupBy": "x"}]}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sorted_projection() {
        let (store, _) = store();
        let parsed = script(json!({
            "entity": "Task",
            "steps": [
                {"sortBy": [{"fieldName": "title", "ascending": true}]},
                {"select": ["title"]}
            ]
        }));
        let out = parsed.evaluate(&store, &RequestContext::internal()).await.unwrap();
        assert_eq!(
            out,
            json!([{"title": "ship"}, {"title": "test"}, {"title": "write"}])
        );
    }

    #[tokio::test]
    async fn test_count_and_min() {
        let (store, channel) = store();
        let ctx = RequestContext::internal();

        let count = script(json!({
            "entity": "Task",
            "steps": [{"filter": {"priority": {"$gt": 1}}}],
            "terminal": "count"
        }));
        assert_eq!(count.evaluate(&store, &ctx).await.unwrap(), json!(1));

        let min = script(json!({"entity": "Task", "terminal": {"min": "priority"}}));
        assert_eq!(min.evaluate(&store, &ctx).await.unwrap(), json!(1));
        assert_eq!(channel.open_handles(), 0);
    }
}
