//! Pushdown evaluator
//!
//! Splits a walked chain into a prefix executed by the remote engine and a
//! suffix executed in-process. The prefix runs from the root scan up to the
//! last node before the first one the policy cannot represent remotely.
//!
//! ```text
//! Scan -> ExpressionFilter -> SortBy -> PredicateFilter -> Take
//! |------------ remote ------------|  |------ local ------|
//! ```
//!
//! A `Take(0)` anywhere short-circuits: nothing up to and including it is
//! evaluated and no remote query is opened.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::chain::Operator;
use super::errors::{QueryError, QueryResult};
use crate::remote::RemoteQuery;

/// Which operators may be delegated to the remote engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushdownPolicy {
    pub push_take: bool,
    pub push_skip: bool,
    pub push_project: bool,
    pub push_expression_filter: bool,
    /// Number of `SortBy` nodes the remote may receive, 0 or 1
    pub max_pushed_sorts: u8,
    /// Stop delegating right after the first pushed `Take` or `Skip`
    pub stop_after_limit: bool,
}

impl Default for PushdownPolicy {
    fn default() -> Self {
        Self {
            push_take: true,
            push_skip: true,
            push_project: true,
            push_expression_filter: true,
            max_pushed_sorts: 1,
            stop_after_limit: false,
        }
    }
}

impl PushdownPolicy {
    /// Only the scan runs remotely
    pub fn scan_only() -> Self {
        Self {
            push_take: false,
            push_skip: false,
            push_project: false,
            push_expression_filter: false,
            max_pushed_sorts: 0,
            stop_after_limit: false,
        }
    }

    /// Everything up to and including the first `Take` or `Skip`
    pub fn until_take() -> Self {
        Self {
            stop_after_limit: true,
            ..Self::default()
        }
    }

    /// Length of the remote prefix of `ops` (root included)
    pub fn split_point(&self, ops: &[&Operator]) -> usize {
        let mut sorts = 0u8;
        for (i, op) in ops.iter().enumerate().skip(1) {
            let representable = match op {
                Operator::Take { .. } => self.push_take,
                Operator::Skip { .. } => self.push_skip,
                Operator::Project { .. } => self.push_project,
                Operator::ExpressionFilter { .. } => self.push_expression_filter,
                Operator::SortBy { .. } => {
                    sorts += 1;
                    sorts <= self.max_pushed_sorts
                }
                Operator::Scan { .. }
                | Operator::PredicateFilter { .. }
                | Operator::Aggregate { .. }
                | Operator::Map { .. } => false,
            };
            if !representable {
                return i;
            }
            if self.stop_after_limit && matches!(op, Operator::Take { .. } | Operator::Skip { .. })
            {
                return i + 1;
            }
        }
        ops.len()
    }
}

/// Outcome of splitting one chain
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Scanned entity
    pub entity: String,
    /// Document to open remotely, `None` when short-circuited
    pub remote: Option<RemoteQuery>,
    /// Operators applied locally, in order
    pub local: Vec<Operator>,
    /// True when a `Take(0)` made the remote part unnecessary
    pub short_circuit: bool,
}

impl SplitPlan {
    /// Splits walked operators (root first) under `policy`
    pub fn build(ops: &[&Operator], policy: &PushdownPolicy) -> QueryResult<Self> {
        let entity = match ops.first() {
            Some(Operator::Scan { entity }) => entity.clone(),
            _ => {
                return Err(QueryError::InternalConsistency(
                    "chain does not start with a scan".to_string(),
                ))
            }
        };

        if let Some(zero) = ops.iter().rposition(|op| op.is_empty_take()) {
            return Ok(Self {
                entity,
                remote: None,
                local: ops[zero + 1..].iter().map(|op| (*op).clone()).collect(),
                short_circuit: true,
            });
        }

        let split = policy.split_point(ops);
        Ok(Self {
            entity,
            remote: Some(to_remote(&ops[..split])?),
            local: ops[split..].iter().map(|op| (*op).clone()).collect(),
            short_circuit: false,
        })
    }

    /// True when rows leave the remote engine as partial records
    pub fn is_projected(&self) -> bool {
        self.remote
            .as_ref()
            .map(RemoteQuery::is_projected)
            .unwrap_or(false)
    }

    /// JSON rendering used by `explain`
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "entity": self.entity,
            "remote": self.remote,
            "local": self.local.iter().map(Operator::describe).collect::<Vec<_>>(),
            "shortCircuit": self.short_circuit,
        })
    }
}

/// Serializes a representable prefix
fn to_remote(prefix: &[&Operator]) -> QueryResult<RemoteQuery> {
    let mut iter = prefix.iter();
    let mut query = match iter.next() {
        Some(Operator::Scan { entity }) => RemoteQuery::BaseEntity {
            name: entity.clone(),
        },
        _ => {
            return Err(QueryError::InternalConsistency(
                "remote prefix does not start with a scan".to_string(),
            ))
        }
    };

    for op in iter {
        let inner = Box::new(query);
        query = match op {
            Operator::Take { count } => RemoteQuery::Take {
                count: *count,
                inner,
            },
            Operator::Skip { count } => RemoteQuery::Skip {
                count: *count,
                inner,
            },
            Operator::Project { columns } => RemoteQuery::ColumnsSelect {
                columns: columns.clone(),
                inner,
            },
            Operator::ExpressionFilter { expression, .. } => RemoteQuery::ExpressionFilter {
                expression: expression.clone(),
                inner,
            },
            Operator::SortBy { keys } => RemoteQuery::SortBy {
                keys: keys.clone(),
                inner,
            },
            other => {
                return Err(QueryError::InternalConsistency(format!(
                    "{} cannot be sent to the remote engine",
                    other.name()
                )))
            }
        };
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Expr;
    use crate::remote::SortKey;
    use crate::value::Value;
    use std::sync::Arc;

    fn scan() -> Operator {
        Operator::Scan {
            entity: "Foo".into(),
        }
    }

    fn expr_filter() -> Operator {
        let expression = Expr::eq(Expr::property("a"), Expr::literal(1.0));
        let e = expression.clone();
        Operator::ExpressionFilter {
            predicate: Arc::new(move |v: &Value| e.matches(v)),
            expression,
        }
    }

    fn predicate() -> Operator {
        Operator::PredicateFilter {
            predicate: Arc::new(|_: &Value| -> QueryResult<bool> { Ok(true) }),
        }
    }

    fn sort(field: &str) -> Operator {
        Operator::SortBy {
            keys: vec![SortKey::asc(field)],
        }
    }

    fn names(ops: &[Operator]) -> Vec<&'static str> {
        ops.iter().map(Operator::name).collect()
    }

    #[test]
    fn test_split_at_predicate_filter() {
        let ops = [scan(), expr_filter(), sort("a"), predicate(), Operator::Take { count: 2 }];
        let refs: Vec<_> = ops.iter().collect();
        let plan = SplitPlan::build(&refs, &PushdownPolicy::default()).unwrap();

        let remote = plan.remote.as_ref().unwrap();
        let kinds: Vec<_> = remote.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["BaseEntity", "ExpressionFilter", "SortBy"]);
        assert_eq!(names(&plan.local), vec!["PredicateFilter", "Take"]);
        assert!(!plan.short_circuit);
    }

    #[test]
    fn test_second_sort_stays_local() {
        let ops = [scan(), sort("a"), Operator::Take { count: 5 }, sort("b")];
        let refs: Vec<_> = ops.iter().collect();
        let plan = SplitPlan::build(&refs, &PushdownPolicy::default()).unwrap();
        assert_eq!(names(&plan.local), vec!["SortBy"]);
    }

    #[test]
    fn test_fully_representable_chain() {
        let ops = [
            scan(),
            expr_filter(),
            Operator::Skip { count: 1 },
            Operator::Project {
                columns: vec!["a".into()],
            },
        ];
        let refs: Vec<_> = ops.iter().collect();
        let plan = SplitPlan::build(&refs, &PushdownPolicy::default()).unwrap();
        assert!(plan.local.is_empty());
        assert!(plan.is_projected());
    }

    #[test]
    fn test_presets_move_split_point() {
        let ops = [
            scan(),
            expr_filter(),
            Operator::Take { count: 3 },
            sort("a"),
        ];
        let refs: Vec<_> = ops.iter().collect();

        assert_eq!(PushdownPolicy::default().split_point(&refs), 4);
        assert_eq!(PushdownPolicy::until_take().split_point(&refs), 3);
        assert_eq!(PushdownPolicy::scan_only().split_point(&refs), 1);
    }

    #[test]
    fn test_take_zero_short_circuits() {
        let ops = [
            scan(),
            expr_filter(),
            Operator::Take { count: 0 },
            Operator::Map {
                transform: Arc::new(|v: Value| -> QueryResult<Value> { Ok(v) }),
            },
        ];
        let refs: Vec<_> = ops.iter().collect();
        let plan = SplitPlan::build(&refs, &PushdownPolicy::default()).unwrap();
        assert!(plan.short_circuit);
        assert!(plan.remote.is_none());
        assert_eq!(names(&plan.local), vec!["Map"]);
    }

    #[test]
    fn test_explain_json() {
        let ops = [scan(), predicate()];
        let refs: Vec<_> = ops.iter().collect();
        let plan = SplitPlan::build(&refs, &PushdownPolicy::default()).unwrap();
        let doc = plan.to_json();
        assert_eq!(doc["remote"]["type"], "BaseEntity");
        assert_eq!(doc["local"][0], "PredicateFilter");
        assert_eq!(doc["shortCircuit"], false);
    }

    #[test]
    fn test_missing_scan_is_defect() {
        let ops = [Operator::Take { count: 1 }];
        let refs: Vec<_> = ops.iter().collect();
        assert!(SplitPlan::build(&refs, &PushdownPolicy::default())
            .unwrap_err()
            .is_defect());
    }
}
