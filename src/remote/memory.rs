//! In-memory reference engine
//!
//! Holds JSON rows per entity and executes a `RemoteQuery` against them.
//! The result is computed at `open` and drained by `next`. Every open and
//! close is counted so callers can verify handle discipline.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;

use super::channel::{ChannelFuture, QueryHandle, RawRow, RemoteChannel};
use super::errors::{ChannelError, ChannelResult};
use super::wire::{RemoteQuery, SortKey};
use crate::query::RequestContext;
use crate::value::{total_cmp, Entity, Value};

struct OpenQuery {
    rows: VecDeque<RawRow>,
    served: usize,
}

/// In-memory `RemoteChannel`
#[derive(Default)]
pub struct MemoryChannel {
    tables: RwLock<HashMap<String, Vec<RawRow>>>,
    open: Mutex<HashMap<u64, OpenQuery>>,
    next_handle: AtomicU64,
    opens: AtomicUsize,
    closes: AtomicUsize,
    rows_served: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    opened_queries: Mutex<Vec<RemoteQuery>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rows for `entity`. Non-object values are skipped.
    pub fn with_rows(self, entity: impl Into<String>, rows: Vec<JsonValue>) -> Self {
        self.insert_rows(entity, rows);
        self
    }

    /// Adds rows for `entity`. Non-object values are skipped.
    pub fn insert_rows(&self, entity: impl Into<String>, rows: Vec<JsonValue>) {
        let mut tables = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let table = tables.entry(entity.into()).or_default();
        table.extend(rows.into_iter().filter_map(|row| match row {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }));
    }

    /// Makes `next` fail once a query has served `rows` rows
    pub fn fail_after(self, rows: usize) -> Self {
        if let Ok(mut slot) = self.fail_after.lock() {
            *slot = Some(rows);
        }
        self
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of successful closes
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of rows handed out by `next`
    pub fn rows_served(&self) -> usize {
        self.rows_served.load(Ordering::SeqCst)
    }

    /// Handles opened but not yet closed
    pub fn open_handles(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    /// Documents received by `open`, oldest first
    pub fn opened_queries(&self) -> Vec<RemoteQuery> {
        self.opened_queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    fn execute(&self, query: &RemoteQuery) -> ChannelResult<Vec<RawRow>> {
        match query {
            RemoteQuery::BaseEntity { name } => {
                let tables = self
                    .tables
                    .read()
                    .map_err(|e| ChannelError::Open(e.to_string()))?;
                tables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ChannelError::Open(format!("no such table: {}", name)))
            }
            RemoteQuery::ExpressionFilter { expression, inner } => {
                let entity = inner.entity_name().to_string();
                let compiled = expression
                    .compile()
                    .map_err(|e| ChannelError::Open(e.to_string()))?;
                let mut kept = Vec::new();
                for row in self.execute(inner)? {
                    let element = row_as_entity(&entity, &row);
                    if compiled
                        .matches(&element)
                        .map_err(|e| ChannelError::Open(e.to_string()))?
                    {
                        kept.push(row);
                    }
                }
                Ok(kept)
            }
            RemoteQuery::ColumnsSelect { columns, inner } => Ok(self
                .execute(inner)?
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(JsonValue::Null)))
                        .collect()
                })
                .collect()),
            RemoteQuery::Take { count, inner } => {
                let mut rows = self.execute(inner)?;
                rows.truncate(usize::try_from(*count).unwrap_or(usize::MAX));
                Ok(rows)
            }
            RemoteQuery::Skip { count, inner } => Ok(self
                .execute(inner)?
                .into_iter()
                .skip(usize::try_from(*count).unwrap_or(usize::MAX))
                .collect()),
            RemoteQuery::SortBy { keys, inner } => {
                let mut rows = self.execute(inner)?;
                rows.sort_by(|a, b| compare_rows(keys, a, b));
                Ok(rows)
            }
        }
    }
}

fn row_as_entity(entity: &str, row: &RawRow) -> Value {
    let mut out = Entity::new(entity);
    for (key, value) in row {
        out.set(key.clone(), Value::from_json(value.clone()));
    }
    Value::Entity(out)
}

fn compare_rows(keys: &[SortKey], a: &RawRow, b: &RawRow) -> std::cmp::Ordering {
    for key in keys {
        let left = Value::from_json(a.get(&key.field_name).cloned().unwrap_or(JsonValue::Null));
        let right = Value::from_json(b.get(&key.field_name).cloned().unwrap_or(JsonValue::Null));
        let ord = total_cmp(&left, &right);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

impl RemoteChannel for MemoryChannel {
    fn open<'a>(
        &'a self,
        query: &'a RemoteQuery,
        _ctx: &'a RequestContext,
    ) -> ChannelFuture<'a, QueryHandle> {
        Box::pin(async move {
            let rows = self.execute(query)?;
            let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;

            self.open
                .lock()
                .map_err(|e| ChannelError::Open(e.to_string()))?
                .insert(
                    id,
                    OpenQuery {
                        rows: rows.into(),
                        served: 0,
                    },
                );
            if let Ok(mut log) = self.opened_queries.lock() {
                log.push(query.clone());
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(QueryHandle(id))
        })
    }

    fn next(&self, handle: QueryHandle) -> ChannelFuture<'_, Option<RawRow>> {
        Box::pin(async move {
            let fail_after = self
                .fail_after
                .lock()
                .map_err(|e| ChannelError::Next(e.to_string()))?
                .to_owned();
            let mut open = self
                .open
                .lock()
                .map_err(|e| ChannelError::Next(e.to_string()))?;
            let query = open
                .get_mut(&handle.0)
                .ok_or(ChannelError::UnknownHandle(handle.0))?;

            if fail_after == Some(query.served) {
                return Err(ChannelError::Next(format!(
                    "injected failure after {} rows",
                    query.served
                )));
            }

            let row = query.rows.pop_front();
            if row.is_some() {
                query.served += 1;
                self.rows_served.fetch_add(1, Ordering::SeqCst);
            }
            Ok(row)
        })
    }

    fn close(&self, handle: QueryHandle) -> ChannelFuture<'_, ()> {
        Box::pin(async move {
            self.open
                .lock()
                .map_err(|e| ChannelError::Close(e.to_string()))?
                .remove(&handle.0)
                .ok_or(ChannelError::UnknownHandle(handle.0))?;
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Expr;
    use serde_json::json;

    fn people() -> MemoryChannel {
        MemoryChannel::new().with_rows(
            "Person",
            vec![
                json!({"id": "1", "name": "Cleo", "age": 41}),
                json!({"id": "2", "name": "Arne", "age": 17}),
                json!({"id": "3", "name": "Bea", "age": 29}),
            ],
        )
    }

    async fn drain(channel: &MemoryChannel, query: &RemoteQuery) -> Vec<RawRow> {
        let ctx = RequestContext::internal();
        let handle = channel.open(query, &ctx).await.unwrap();
        let mut out = Vec::new();
        while let Some(row) = channel.next(handle).await.unwrap() {
            out.push(row);
        }
        channel.close(handle).await.unwrap();
        out
    }

    fn base() -> Box<RemoteQuery> {
        Box::new(RemoteQuery::BaseEntity {
            name: "Person".into(),
        })
    }

    #[tokio::test]
    async fn test_filter_sort_take() {
        let channel = people();
        let query = RemoteQuery::Take {
            count: 1,
            inner: Box::new(RemoteQuery::SortBy {
                keys: vec![SortKey::asc("name")],
                inner: Box::new(RemoteQuery::ExpressionFilter {
                    expression: Expr::binary(
                        crate::query::BinaryOp::Gt,
                        Expr::property("age"),
                        Expr::literal(18.0),
                    ),
                    inner: base(),
                }),
            }),
        };
        let rows = drain(&channel, &query).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Bea"));
        assert_eq!(channel.opens(), 1);
        assert_eq!(channel.closes(), 1);
        assert_eq!(channel.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_columns_select_and_skip() {
        let channel = people();
        let query = RemoteQuery::ColumnsSelect {
            columns: vec!["name".into()],
            inner: Box::new(RemoteQuery::Skip {
                count: 2,
                inner: base(),
            }),
        };
        let rows = drain(&channel, &query).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(JsonValue::Object(rows[0].clone()), json!({"name": "Bea"}));
    }

    #[tokio::test]
    async fn test_columns_select_fills_missing_with_null() {
        let channel = MemoryChannel::new().with_rows("P", vec![json!({"nick": "x"}), json!({})]);
        let query = RemoteQuery::ColumnsSelect {
            columns: vec!["nick".into()],
            inner: Box::new(RemoteQuery::BaseEntity { name: "P".into() }),
        };
        let rows: Vec<_> = drain(&channel, &query)
            .await
            .into_iter()
            .map(JsonValue::Object)
            .collect();
        assert_eq!(rows, vec![json!({"nick": "x"}), json!({"nick": null})]);
    }

    #[tokio::test]
    async fn test_closed_handle_rejected() {
        let channel = people();
        let ctx = RequestContext::internal();
        let query = RemoteQuery::BaseEntity {
            name: "Person".into(),
        };
        let handle = channel.open(&query, &ctx).await.unwrap();
        channel.close(handle).await.unwrap();

        assert_eq!(
            channel.next(handle).await,
            Err(ChannelError::UnknownHandle(handle.0))
        );
        assert_eq!(
            channel.close(handle).await,
            Err(ChannelError::UnknownHandle(handle.0))
        );
        assert_eq!(channel.closes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let channel = MemoryChannel::new();
        let ctx = RequestContext::internal();
        let query = RemoteQuery::BaseEntity { name: "Nope".into() };
        assert!(matches!(
            channel.open(&query, &ctx).await,
            Err(ChannelError::Open(_))
        ));
        assert_eq!(channel.opens(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let channel = people().fail_after(1);
        let ctx = RequestContext::internal();
        let handle = channel.open(&*base(), &ctx).await.unwrap();
        assert!(channel.next(handle).await.unwrap().is_some());
        assert!(matches!(
            channel.next(handle).await,
            Err(ChannelError::Next(_))
        ));
        channel.close(handle).await.unwrap();
    }
}
