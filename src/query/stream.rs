//! Local pipeline
//!
//! Pull-based row streams. Each adapter wraps its upstream and forwards
//! `close` to it; the source at the bottom is either the remote query or an
//! empty stream (short-circuited chains).
//!
//! ```text
//! QueryStream
//!   -> TakeStream
//!     -> FilterStream
//!       -> RemoteSource  (open remote handle, materializes rows)
//! ```
//!
//! The remote handle is released exactly once: by `close`, or, for a source
//! dropped while still open, by a close task spawned on the current tokio
//! runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream};

use super::aggregate::AggregateStream;
use super::chain::{Operator, Predicate, Transform};
use super::context::RequestContext;
use super::errors::{QueryError, QueryResult};
use super::pushdown::SplitPlan;
use super::sort::SortStream;
use crate::materialize::Materializer;
use crate::observability::Logger;
use crate::remote::{QueryHandle, RemoteChannel, RemoteQuery};
use crate::value::{Record, Value};

/// Boxed future returned by row streams
pub type RowFuture<'a, T> = Pin<Box<dyn Future<Output = QueryResult<T>> + Send + 'a>>;

/// A pull-based stream of pipeline elements
pub trait RowStream: Send {
    /// Next element, `None` at the end
    fn next(&mut self) -> RowFuture<'_, Option<Value>>;

    /// Releases upstream resources. Safe to call more than once.
    fn close(&mut self) -> RowFuture<'_, ()>;
}

pub type BoxRowStream = Box<dyn RowStream>;

/// Reads `field` of an element, treating unset entity fields as null
pub(crate) fn field_or_null(element: &Value, field: &str) -> QueryResult<Value> {
    Ok(element.field(field)?.cloned().unwrap_or(Value::Null))
}

/// Source for short-circuited chains
pub struct EmptySource;

impl RowStream for EmptySource {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async { Ok(None) })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Rows of an open remote query, materialized as they arrive
pub struct RemoteSource {
    channel: Arc<dyn RemoteChannel>,
    handle: Option<QueryHandle>,
    materializer: Materializer,
    entity: String,
    columns: Option<Vec<String>>,
}

impl RemoteSource {
    /// Opens `query` on `channel`
    pub async fn open(
        channel: Arc<dyn RemoteChannel>,
        query: &RemoteQuery,
        ctx: &RequestContext,
        materializer: Materializer,
    ) -> QueryResult<Self> {
        let handle = channel.open(query, ctx).await?;
        Logger::info(
            "REMOTE_OPEN",
            &[
                ("entity", query.entity_name()),
                ("handle", &handle.0.to_string()),
                ("request_id", &ctx.request_id.to_string()),
                ("root", query.kind()),
            ],
        );
        Ok(Self {
            channel,
            handle: Some(handle),
            materializer,
            entity: query.entity_name().to_string(),
            columns: query.selected_columns().map(<[String]>::to_vec),
        })
    }
}

impl RowStream for RemoteSource {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            let Some(handle) = self.handle else {
                return Ok(None);
            };
            match self.channel.next(handle).await? {
                Some(row) => self
                    .materializer
                    .to_output(&self.entity, row, self.columns.as_deref())
                    .map(Some),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        Box::pin(async move {
            if let Some(handle) = self.handle.take() {
                self.channel.close(handle).await?;
                Logger::info(
                    "REMOTE_CLOSE",
                    &[("entity", &self.entity), ("handle", &handle.0.to_string())],
                );
            }
            Ok(())
        })
    }
}

impl Drop for RemoteSource {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let handle_str = handle.0.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let channel = Arc::clone(&self.channel);
                let entity = self.entity.clone();
                runtime.spawn(async move {
                    match channel.close(handle).await {
                        Ok(()) => Logger::info(
                            "REMOTE_CLOSE",
                            &[("entity", &entity), ("handle", &handle.0.to_string())],
                        ),
                        Err(e) => Logger::warn(
                            "REMOTE_CLOSE_FAILED",
                            &[
                                ("entity", &entity),
                                ("error", &e.to_string()),
                                ("handle", &handle.0.to_string()),
                            ],
                        ),
                    }
                });
            }
            Err(_) => Logger::warn(
                "REMOTE_CLOSE_SKIPPED",
                &[
                    ("entity", &self.entity),
                    ("handle", &handle_str),
                    ("reason", "no async runtime"),
                ],
            ),
        }
    }
}

struct TakeStream {
    upstream: BoxRowStream,
    remaining: u64,
}

impl RowStream for TakeStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            if self.remaining == 0 {
                return Ok(None);
            }
            let item = self.upstream.next().await?;
            if item.is_some() {
                self.remaining -= 1;
            }
            Ok(item)
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

struct SkipStream {
    upstream: BoxRowStream,
    pending: u64,
}

impl RowStream for SkipStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            while self.pending > 0 {
                if self.upstream.next().await?.is_none() {
                    self.pending = 0;
                    return Ok(None);
                }
                self.pending -= 1;
            }
            self.upstream.next().await
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

struct FilterStream {
    upstream: BoxRowStream,
    predicate: Predicate,
}

impl RowStream for FilterStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            while let Some(item) = self.upstream.next().await? {
                if (self.predicate)(&item)? {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

struct ProjectStream {
    upstream: BoxRowStream,
    columns: Vec<String>,
}

/// Narrows an element to `columns`
pub(crate) fn project_value(element: Value, columns: &[String]) -> QueryResult<Value> {
    match element {
        Value::Entity(entity) => Ok(Value::Record(entity.project(columns))),
        Value::Record(mut record) => {
            let mut out = Record::new();
            for column in columns {
                let value = record
                    .remove(column)
                    .ok_or_else(|| QueryError::FieldNotSelected(column.clone()))?;
                out.insert(column.clone(), value);
            }
            Ok(Value::Record(out))
        }
        other => Err(QueryError::InvalidOperation(format!(
            "cannot select columns of a {} value",
            other.kind_name()
        ))),
    }
}

impl RowStream for ProjectStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            match self.upstream.next().await? {
                Some(item) => project_value(item, &self.columns).map(Some),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

struct MapStream {
    upstream: BoxRowStream,
    transform: Transform,
}

impl RowStream for MapStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            match self.upstream.next().await? {
                Some(item) => (self.transform)(item).map(Some),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

/// Wraps `upstream` with the local adapter for `op`
pub(crate) fn apply(upstream: BoxRowStream, op: &Operator) -> QueryResult<BoxRowStream> {
    let stream: BoxRowStream = match op {
        Operator::Scan { .. } => {
            return Err(QueryError::InternalConsistency(
                "Scan cannot run as a local stage".to_string(),
            ))
        }
        Operator::Take { count } => Box::new(TakeStream {
            upstream,
            remaining: *count,
        }),
        Operator::Skip { count } => Box::new(SkipStream {
            upstream,
            pending: *count,
        }),
        Operator::Project { columns } => Box::new(ProjectStream {
            upstream,
            columns: columns.clone(),
        }),
        Operator::PredicateFilter { predicate } | Operator::ExpressionFilter { predicate, .. } => {
            Box::new(FilterStream {
                upstream,
                predicate: Arc::clone(predicate),
            })
        }
        Operator::SortBy { keys } => Box::new(SortStream::new(upstream, keys.clone())),
        Operator::Aggregate {
            field,
            initial,
            fold,
            kind,
        } => Box::new(AggregateStream::new(
            upstream,
            field.clone(),
            *kind,
            initial.clone(),
            fold.clone(),
        )),
        Operator::Map { transform } => Box::new(MapStream {
            upstream,
            transform: Arc::clone(transform),
        }),
    };
    Ok(stream)
}

/// Opens the remote part of `plan` (if any) and stacks the local part on it
pub(crate) async fn assemble(
    plan: &SplitPlan,
    channel: Arc<dyn RemoteChannel>,
    materializer: Materializer,
    ctx: &RequestContext,
) -> QueryResult<QueryStream> {
    let mut stream: BoxRowStream = match &plan.remote {
        Some(query) => Box::new(RemoteSource::open(channel, query, ctx, materializer).await?),
        None => Box::new(EmptySource),
    };
    for op in &plan.local {
        stream = apply(stream, op)?;
    }
    Ok(QueryStream::new(stream))
}

/// Caller-facing stream of one cursor iteration.
///
/// Call `close` when done; a stream dropped while open still releases its
/// remote handle in the background.
pub struct QueryStream {
    inner: BoxRowStream,
    closed: bool,
    rows: u64,
}

impl QueryStream {
    pub(crate) fn new(inner: BoxRowStream) -> Self {
        Self {
            inner,
            closed: false,
            rows: 0,
        }
    }

    /// Next element, `None` at the end or after `close`
    pub async fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.closed {
            return Ok(None);
        }
        let item = self.inner.next().await?;
        if item.is_some() {
            self.rows += 1;
        }
        Ok(item)
    }

    /// Releases the remote handle. Later calls are no-ops.
    pub async fn close(&mut self) -> QueryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close().await
    }

    /// Elements produced so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Adapts into a `futures` stream that closes itself at the end or on
    /// the first error
    pub fn into_stream(self) -> impl Stream<Item = QueryResult<Value>> + Send {
        stream::try_unfold(self, |mut s| async move {
            match s.next().await {
                Ok(Some(item)) => Ok(Some((item, s))),
                Ok(None) => {
                    s.close().await?;
                    Ok(None)
                }
                Err(e) => {
                    if let Err(close_err) = s.close().await {
                        Logger::warn(
                            "REMOTE_CLOSE_FAILED",
                            &[("error", &close_err.to_string())],
                        );
                    }
                    Err(e)
                }
            }
        })
    }
}
