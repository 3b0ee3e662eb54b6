//! Operator chain
//!
//! A cursor is a singly linked list of operator nodes. Each node holds an
//! `Arc` to its predecessor; the root is the entity scan. Building a longer
//! chain shares the existing nodes, so cursors derived from one another
//! never observe each other's transformations.

use std::fmt;
use std::sync::Arc;

use super::errors::{QueryError, QueryResult};
use super::expr::Expr;
use crate::remote::SortKey;
use crate::value::Value;

/// In-process filter predicate
pub type Predicate = Arc<dyn Fn(&Value) -> QueryResult<bool> + Send + Sync>;

/// In-process element transformation
pub type Transform = Arc<dyn Fn(Value) -> QueryResult<Value> + Send + Sync>;

/// Aggregate step: `(accumulator, candidate) -> accumulator`.
/// The accumulator starts as the aggregate's initial value, or `None`.
pub type Fold = Arc<dyn Fn(Option<Value>, &Value) -> QueryResult<Value> + Send + Sync>;

/// Aggregate flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// Smallest non-null candidate
    Min,
    /// Largest non-null candidate
    Max,
    /// Caller-supplied fold over every candidate
    Fold,
}

/// One logical transformation
#[derive(Clone)]
pub enum Operator {
    Scan {
        entity: String,
    },
    Take {
        count: u64,
    },
    Skip {
        count: u64,
    },
    Project {
        columns: Vec<String>,
    },
    PredicateFilter {
        predicate: Predicate,
    },
    ExpressionFilter {
        predicate: Predicate,
        expression: Expr,
    },
    SortBy {
        keys: Vec<SortKey>,
    },
    Aggregate {
        field: String,
        initial: Option<Value>,
        fold: Option<Fold>,
        kind: AggregateKind,
    },
    Map {
        transform: Transform,
    },
}

impl Operator {
    /// Variant name
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Scan { .. } => "Scan",
            Operator::Take { .. } => "Take",
            Operator::Skip { .. } => "Skip",
            Operator::Project { .. } => "Project",
            Operator::PredicateFilter { .. } => "PredicateFilter",
            Operator::ExpressionFilter { .. } => "ExpressionFilter",
            Operator::SortBy { .. } => "SortBy",
            Operator::Aggregate { .. } => "Aggregate",
            Operator::Map { .. } => "Map",
        }
    }

    /// Short human-readable form, e.g. `Take(2)` or `SortBy(name asc)`
    pub fn describe(&self) -> String {
        match self {
            Operator::Scan { entity } => format!("Scan({})", entity),
            Operator::Take { count } => format!("Take({})", count),
            Operator::Skip { count } => format!("Skip({})", count),
            Operator::Project { columns } => format!("Project({})", columns.join(", ")),
            Operator::PredicateFilter { .. } => "PredicateFilter".to_string(),
            Operator::ExpressionFilter { expression, .. } => {
                format!("ExpressionFilter({})", expression.referenced_fields().join(", "))
            }
            Operator::SortBy { keys } => format!(
                "SortBy({})",
                keys.iter()
                    .map(|k| format!(
                        "{} {}",
                        k.field_name,
                        if k.ascending { "asc" } else { "desc" }
                    ))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Operator::Aggregate { field, kind, .. } => match kind {
                AggregateKind::Min => format!("MinBy({})", field),
                AggregateKind::Max => format!("MaxBy({})", field),
                AggregateKind::Fold => format!("Aggregate({})", field),
            },
            Operator::Map { .. } => "Map".to_string(),
        }
    }

    /// Zero-row take
    pub(crate) fn is_empty_take(&self) -> bool {
        matches!(self, Operator::Take { count: 0 })
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A node of the chain
#[derive(Debug)]
pub struct OperatorNode {
    op: Operator,
    inner: Option<Arc<OperatorNode>>,
}

impl OperatorNode {
    /// Root scan of `entity`
    pub fn scan(entity: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            op: Operator::Scan {
                entity: entity.into(),
            },
            inner: None,
        })
    }

    /// New node applying `op` on top of `inner`
    pub fn wrap(inner: &Arc<Self>, op: Operator) -> Arc<Self> {
        Arc::new(Self {
            op,
            inner: Some(Arc::clone(inner)),
        })
    }

    /// Unchecked constructor; `walk` reports malformed chains
    pub(crate) fn from_parts(op: Operator, inner: Option<Arc<Self>>) -> Arc<Self> {
        Arc::new(Self { op, inner })
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn inner(&self) -> Option<&Arc<OperatorNode>> {
        self.inner.as_ref()
    }

    /// Number of nodes from the root up to and including this one
    pub fn len(&self) -> usize {
        let mut count = 1;
        let mut current = self.inner.as_deref();
        while let Some(node) = current {
            count += 1;
            current = node.inner.as_deref();
        }
        count
    }

    /// Operators in application order, root first.
    ///
    /// Fails with `InternalConsistency` unless the chain has exactly one
    /// `Scan`, at the root.
    pub fn walk(&self) -> QueryResult<Vec<&Operator>> {
        let mut ops = Vec::with_capacity(self.len());
        let mut current = Some(self);
        while let Some(node) = current {
            match (&node.op, node.inner.as_deref()) {
                (Operator::Scan { .. }, Some(_)) => {
                    return Err(QueryError::InternalConsistency(
                        "Scan node has a predecessor".to_string(),
                    ))
                }
                (op, None) if !matches!(op, Operator::Scan { .. }) => {
                    return Err(QueryError::InternalConsistency(format!(
                        "{} node has no predecessor",
                        op.name()
                    )))
                }
                _ => {}
            }
            ops.push(&node.op);
            current = node.inner.as_deref();
        }
        ops.reverse();
        Ok(ops)
    }

    /// Scanned entity
    pub fn entity(&self) -> QueryResult<&str> {
        let ops = self.walk()?;
        match ops.first().copied() {
            Some(Operator::Scan { entity }) => Ok(entity.as_str()),
            _ => Err(QueryError::InternalConsistency(
                "chain has no root scan".to_string(),
            )),
        }
    }

    /// Columns still readable from the element at this node.
    ///
    /// `None` means the shape is not known to be restricted: either no
    /// projection applies, or a `Map` or `Aggregate` reshaped the element
    /// after it.
    pub fn selected_columns(&self) -> Option<&[String]> {
        let mut current = Some(self);
        while let Some(node) = current {
            match &node.op {
                Operator::Project { columns } => return Some(columns),
                Operator::Map { .. } | Operator::Aggregate { .. } | Operator::Scan { .. } => {
                    return None
                }
                _ => current = node.inner.as_deref(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<OperatorNode> {
        let scan = OperatorNode::scan("Person");
        let take = OperatorNode::wrap(&scan, Operator::Take { count: 3 });
        OperatorNode::wrap(
            &take,
            Operator::Project {
                columns: vec!["name".into()],
            },
        )
    }

    #[test]
    fn test_walk_order() {
        let chain = sample();
        let names: Vec<_> = chain.walk().unwrap().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["Scan", "Take", "Project"]);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.entity().unwrap(), "Person");
    }

    #[test]
    fn test_sharing_does_not_mutate() {
        let scan = OperatorNode::scan("Person");
        let a = OperatorNode::wrap(&scan, Operator::Take { count: 1 });
        let b = OperatorNode::wrap(&scan, Operator::Skip { count: 1 });
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(scan.len(), 1);
    }

    #[test]
    fn test_orphan_node_is_defect() {
        let orphan = OperatorNode::from_parts(Operator::Take { count: 1 }, None);
        let err = orphan.walk().unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn test_nested_scan_is_defect() {
        let scan = OperatorNode::scan("A");
        let bad = OperatorNode::from_parts(
            Operator::Scan {
                entity: "B".into(),
            },
            Some(scan),
        );
        assert!(bad.walk().unwrap_err().is_defect());
    }

    #[test]
    fn test_selected_columns() {
        let chain = sample();
        assert_eq!(chain.selected_columns(), Some(&["name".to_string()][..]));

        let mapped = OperatorNode::wrap(
            &chain,
            Operator::Map {
                transform: Arc::new(|v: Value| -> QueryResult<Value> { Ok(v) }),
            },
        );
        assert_eq!(mapped.selected_columns(), None);
        assert_eq!(OperatorNode::scan("X").selected_columns(), None);
    }

    #[test]
    fn test_describe() {
        let op = Operator::SortBy {
            keys: vec![SortKey::asc("a"), SortKey::desc("b")],
        };
        assert_eq!(op.describe(), "SortBy(a asc, b desc)");
    }
}
