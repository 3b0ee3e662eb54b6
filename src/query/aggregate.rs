//! Aggregate folds
//!
//! Consumes the whole upstream in order and emits exactly one element: the
//! final accumulator, or null when nothing accumulated. `Min` and `Max` skip
//! null candidates; a caller fold sees every candidate.

use std::cmp::Ordering;

use super::chain::{AggregateKind, Fold};
use super::errors::{QueryError, QueryResult};
use super::stream::{field_or_null, BoxRowStream, RowFuture, RowStream};
use crate::value::{total_cmp, Value};

pub(crate) struct AggregateStream {
    upstream: BoxRowStream,
    field: String,
    kind: AggregateKind,
    initial: Option<Value>,
    fold: Option<Fold>,
    done: bool,
}

impl AggregateStream {
    pub(crate) fn new(
        upstream: BoxRowStream,
        field: String,
        kind: AggregateKind,
        initial: Option<Value>,
        fold: Option<Fold>,
    ) -> Self {
        Self {
            upstream,
            field,
            kind,
            initial,
            fold,
            done: false,
        }
    }

    fn step(&self, acc: Option<Value>, candidate: Value) -> QueryResult<Option<Value>> {
        let keep_if = |wanted: Ordering, acc: Option<Value>| {
            if candidate.is_null() {
                return acc;
            }
            match acc {
                Some(current) if total_cmp(&candidate, &current) != wanted => Some(current),
                _ => Some(candidate.clone()),
            }
        };

        match self.kind {
            AggregateKind::Min => Ok(keep_if(Ordering::Less, acc)),
            AggregateKind::Max => Ok(keep_if(Ordering::Greater, acc)),
            AggregateKind::Fold => {
                let fold = self.fold.as_ref().ok_or_else(|| {
                    QueryError::InternalConsistency(format!(
                        "aggregate over '{}' has no fold",
                        self.field
                    ))
                })?;
                fold(acc, &candidate).map(Some)
            }
        }
    }
}

impl RowStream for AggregateStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            self.done = true;

            let mut acc = self.initial.take();
            while let Some(item) = self.upstream.next().await? {
                let candidate = field_or_null(&item, &self.field)?;
                acc = self.step(acc, candidate)?;
            }
            Ok(Some(acc.unwrap_or(Value::Null)))
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}
