//! Cursor API
//!
//! Cursors are immutable: every builder returns a new cursor one node longer
//! and leaves the receiver untouched. Nothing runs until a terminal
//! operation is awaited; each terminal performs at most one remote
//! round-trip and always closes what it opened.

use std::ops::ControlFlow;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::chain::{AggregateKind, Fold, Operator, OperatorNode};
use super::context::RequestContext;
use super::errors::{QueryError, QueryResult};
use super::expr::Expr;
use super::pushdown::{PushdownPolicy, SplitPlan};
use super::restriction::{compile_filter, Restriction};
use super::stream::{assemble, QueryStream};
use crate::materialize::Materializer;
use crate::observability::{Logger, ObservationScope, QueryMetrics};
use crate::remote::{RemoteChannel, SortKey};
use crate::types::TypeRegistry;
use crate::value::Value;

/// Entry point for queries: a remote channel plus the type registry
#[derive(Clone)]
pub struct EntityStore {
    channel: Arc<dyn RemoteChannel>,
    registry: Arc<TypeRegistry>,
    policy: PushdownPolicy,
    metrics: Arc<QueryMetrics>,
}

impl EntityStore {
    pub fn new(channel: Arc<dyn RemoteChannel>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            channel,
            registry,
            policy: PushdownPolicy::default(),
            metrics: Arc::new(QueryMetrics::new()),
        }
    }

    pub fn with_policy(mut self, policy: PushdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &PushdownPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Counters shared by every cursor of this store
    pub fn metrics(&self) -> &QueryMetrics {
        &self.metrics
    }

    /// Cursor over every row of `entity`
    pub fn cursor(&self, entity: impl Into<String>) -> Cursor {
        Cursor {
            store: self.clone(),
            tip: OperatorNode::scan(entity),
        }
    }
}

/// Lazily evaluated query over one entity
#[derive(Clone)]
pub struct Cursor {
    store: EntityStore,
    tip: Arc<OperatorNode>,
}

impl Cursor {
    fn push(&self, op: Operator) -> Cursor {
        Cursor {
            store: self.store.clone(),
            tip: OperatorNode::wrap(&self.tip, op),
        }
    }

    /// Last node of the chain
    pub fn chain(&self) -> &Arc<OperatorNode> {
        &self.tip
    }

    /// Number of operator nodes, scan included
    pub fn node_count(&self) -> usize {
        self.tip.len()
    }

    /// Restricts elements to `columns`; the result is partial records
    pub fn select<I, S>(&self, columns: I) -> Cursor
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Operator::Project {
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    /// At most `count` elements
    pub fn take(&self, count: u64) -> Cursor {
        self.push(Operator::Take { count })
    }

    /// Drops the first `count` elements
    pub fn skip(&self, count: u64) -> Cursor {
        self.push(Operator::Skip { count })
    }

    /// Keeps elements matching an in-process predicate. Never delegated to
    /// the remote engine.
    pub fn filter<F>(&self, predicate: F) -> Cursor
    where
        F: Fn(&Value) -> QueryResult<bool> + Send + Sync + 'static,
    {
        self.push(Operator::PredicateFilter {
            predicate: Arc::new(predicate),
        })
    }

    /// Keeps elements matching `expression`
    pub fn filter_expr(&self, expression: Expr) -> QueryResult<Cursor> {
        self.check_selected(&expression.referenced_fields())?;
        let compiled = expression.compile()?;
        Ok(self.push(Operator::ExpressionFilter {
            predicate: Arc::new(move |v: &Value| compiled.matches(v)),
            expression,
        }))
    }

    /// Keeps elements matching `predicate`, which must agree with
    /// `expression` on every input
    pub fn filter_with<F>(&self, predicate: F, expression: Expr) -> QueryResult<Cursor>
    where
        F: Fn(&Value) -> QueryResult<bool> + Send + Sync + 'static,
    {
        self.check_selected(&expression.referenced_fields())?;
        Ok(self.push(Operator::ExpressionFilter {
            predicate: Arc::new(predicate),
            expression,
        }))
    }

    /// Equality restriction. Unset entries are skipped; with nothing left the
    /// cursor is returned unchanged.
    pub fn filter_where(&self, restriction: &Restriction) -> QueryResult<Cursor> {
        let fields: Vec<String> = restriction.fields().map(str::to_string).collect();
        self.check_selected(&fields)?;
        match restriction.to_expr()? {
            Some(expression) => self.filter_expr(expression),
            None => Ok(self.clone()),
        }
    }

    /// Filter document (`{"age": {"$gte": 18}, "$or": [...]}`). An empty
    /// document returns the cursor unchanged.
    pub fn filter_json(&self, document: &JsonValue) -> QueryResult<Cursor> {
        match compile_filter(document)? {
            Some(expression) => self.filter_expr(expression),
            None => Ok(self.clone()),
        }
    }

    /// Orders elements by `keys`, first key most significant
    pub fn sort_by<I>(&self, keys: I) -> Cursor
    where
        I: IntoIterator<Item = SortKey>,
    {
        self.push(Operator::SortBy {
            keys: keys.into_iter().collect(),
        })
    }

    /// Single element: smallest non-null `field`, or null
    pub fn min_by(&self, field: impl Into<String>) -> Cursor {
        self.aggregate_node(field.into(), AggregateKind::Min, None, None)
    }

    /// Single element: largest non-null `field`, or null
    pub fn max_by(&self, field: impl Into<String>) -> Cursor {
        self.aggregate_node(field.into(), AggregateKind::Max, None, None)
    }

    /// Single element: `fold` applied left to right over `field` of every
    /// element, starting from `initial`
    pub fn aggregate_by<F>(&self, field: impl Into<String>, initial: Option<Value>, fold: F) -> Cursor
    where
        F: Fn(Option<Value>, &Value) -> QueryResult<Value> + Send + Sync + 'static,
    {
        let fold: Fold = Arc::new(fold);
        self.aggregate_node(field.into(), AggregateKind::Fold, initial, Some(fold))
    }

    fn aggregate_node(
        &self,
        field: String,
        kind: AggregateKind,
        initial: Option<Value>,
        fold: Option<Fold>,
    ) -> Cursor {
        self.push(Operator::Aggregate {
            field,
            initial,
            fold,
            kind,
        })
    }

    /// Transforms every element in-process
    pub fn map<F>(&self, transform: F) -> Cursor
    where
        F: Fn(Value) -> QueryResult<Value> + Send + Sync + 'static,
    {
        self.push(Operator::Map {
            transform: Arc::new(transform),
        })
    }

    fn check_selected(&self, fields: &[String]) -> QueryResult<()> {
        if let Some(columns) = self.tip.selected_columns() {
            if let Some(missing) = fields.iter().find(|f| !columns.contains(f)) {
                return Err(QueryError::FieldNotSelected(missing.clone()));
            }
        }
        Ok(())
    }

    /// Remote/local split this cursor would run with, without contacting
    /// the remote engine
    pub fn explain(&self) -> QueryResult<SplitPlan> {
        let ops = self.tip.walk()?;
        SplitPlan::build(&ops, &self.store.policy)
    }

    async fn open(&self, ctx: &RequestContext) -> QueryResult<QueryStream> {
        let plan = self.explain()?;
        if !self.store.registry.contains(&plan.entity) {
            return Err(QueryError::UnknownEntity(plan.entity));
        }

        Logger::trace(
            "QUERY_SPLIT",
            &[
                ("entity", &plan.entity),
                ("local", &plan.local.len().to_string()),
                ("request_id", &ctx.request_id.to_string()),
                (
                    "remote",
                    &plan
                        .remote
                        .as_ref()
                        .map(|q| q.nodes().len().to_string())
                        .unwrap_or_else(|| "0".to_string()),
                ),
                ("short_circuit", &plan.short_circuit.to_string()),
            ],
        );

        let stream = assemble(
            &plan,
            Arc::clone(&self.store.channel),
            Materializer::new(Arc::clone(&self.store.registry)),
            ctx,
        )
        .await?;
        self.store
            .metrics
            .record_split(plan.remote.is_some(), plan.local.len());
        Ok(stream)
    }

    fn scope(&self, terminal: &str, ctx: &RequestContext) -> ObservationScope {
        let entity = self.tip.entity().unwrap_or("?").to_string();
        ObservationScope::with_fields(
            "CURSOR_ITERATION",
            &[
                ("entity", &entity),
                ("request_id", &ctx.request_id.to_string()),
                ("terminal", terminal),
            ],
        )
    }

    fn fail(&self, scope: ObservationScope, error: QueryError) -> QueryError {
        self.store.metrics.record_failed();
        if error.is_defect() {
            scope.fail_fatal(&error.to_string());
        } else {
            scope.fail(&error.to_string());
        }
        error
    }

    /// Closes `stream` and reports the iteration. The first error wins; a
    /// close failure after a successful drain is returned as the error.
    async fn finish<T>(
        &self,
        scope: ObservationScope,
        mut stream: QueryStream,
        result: QueryResult<T>,
    ) -> QueryResult<T> {
        let closed = stream.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => {
                self.store.metrics.record_completed(stream.rows());
                scope.complete_with_fields(&[("rows", &stream.rows().to_string())]);
                Ok(value)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    Logger::warn("REMOTE_CLOSE_FAILED", &[("error", &close_err.to_string())]);
                }
                Err(self.fail(scope, e))
            }
            (Ok(_), Err(e)) => Err(self.fail(scope, e)),
        }
    }

    /// Opens the iteration for manual pulling. The caller must `close` the
    /// returned stream (dropping it also releases the remote handle).
    pub async fn stream(&self, ctx: &RequestContext) -> QueryResult<QueryStream> {
        self.open(ctx).await
    }

    /// All elements
    pub async fn to_array(&self, ctx: &RequestContext) -> QueryResult<Vec<Value>> {
        let scope = self.scope("to_array", ctx);
        let mut stream = match self.open(ctx).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(scope, e)),
        };

        let mut out = Vec::new();
        let result = loop {
            match stream.next().await {
                Ok(Some(item)) => out.push(item),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.finish(scope, stream, result).await.map(|()| out)
    }

    /// Calls `f` on each element until it returns `Break`
    pub async fn for_each<F>(&self, ctx: &RequestContext, mut f: F) -> QueryResult<()>
    where
        F: FnMut(Value) -> QueryResult<ControlFlow<()>>,
    {
        let scope = self.scope("for_each", ctx);
        let mut stream = match self.open(ctx).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(scope, e)),
        };

        let result = loop {
            match stream.next().await {
                Ok(Some(item)) => match f(item) {
                    Ok(ControlFlow::Continue(())) => {}
                    Ok(ControlFlow::Break(())) => break Ok(()),
                    Err(e) => break Err(e),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.finish(scope, stream, result).await
    }

    /// First element, if any
    pub async fn first(&self, ctx: &RequestContext) -> QueryResult<Option<Value>> {
        let scope = self.scope("first", ctx);
        let mut stream = match self.open(ctx).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(scope, e)),
        };
        let result = stream.next().await;
        self.finish(scope, stream, result).await
    }

    /// Number of elements
    pub async fn count(&self, ctx: &RequestContext) -> QueryResult<u64> {
        let mut total = 0u64;
        self.for_each(ctx, |_| {
            total += 1;
            Ok(ControlFlow::Continue(()))
        })
        .await?;
        Ok(total)
    }

    /// Smallest non-null `field`, `None` when there is none
    pub async fn min(&self, field: &str, ctx: &RequestContext) -> QueryResult<Option<Value>> {
        Ok(defined(self.min_by(field).first(ctx).await?))
    }

    /// Largest non-null `field`, `None` when there is none
    pub async fn max(&self, field: &str, ctx: &RequestContext) -> QueryResult<Option<Value>> {
        Ok(defined(self.max_by(field).first(ctx).await?))
    }

    /// Result of `aggregate_by`, null when nothing accumulated
    pub async fn aggregate<F>(
        &self,
        field: &str,
        initial: Option<Value>,
        fold: F,
        ctx: &RequestContext,
    ) -> QueryResult<Value>
    where
        F: Fn(Option<Value>, &Value) -> QueryResult<Value> + Send + Sync + 'static,
    {
        Ok(self
            .aggregate_by(field, initial, fold)
            .first(ctx)
            .await?
            .unwrap_or(Value::Null))
    }
}

fn defined(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
