//! Operator-chain document sent to the remote engine
//!
//! Each node nests its predecessor under `inner`, so the outermost node is
//! the last operation applied:
//!
//! ```json
//! {"type": "Take", "count": 2, "inner": {
//!     "type": "ExpressionFilter", "expression": {...}, "inner": {
//!         "type": "BaseEntity", "name": "Foo"}}}
//! ```

use serde::{Deserialize, Serialize};

use crate::query::Expr;

/// One sort key: field and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub field_name: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field_name: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field_name: field.into(),
            ascending: false,
        }
    }
}

/// Serialized remote query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RemoteQuery {
    BaseEntity {
        name: String,
    },
    ExpressionFilter {
        expression: Expr,
        inner: Box<RemoteQuery>,
    },
    ColumnsSelect {
        columns: Vec<String>,
        inner: Box<RemoteQuery>,
    },
    Take {
        count: u64,
        inner: Box<RemoteQuery>,
    },
    Skip {
        count: u64,
        inner: Box<RemoteQuery>,
    },
    SortBy {
        keys: Vec<SortKey>,
        inner: Box<RemoteQuery>,
    },
}

impl RemoteQuery {
    /// Scanned entity at the root of the document
    pub fn entity_name(&self) -> &str {
        match self {
            RemoteQuery::BaseEntity { name } => name,
            RemoteQuery::ExpressionFilter { inner, .. }
            | RemoteQuery::ColumnsSelect { inner, .. }
            | RemoteQuery::Take { inner, .. }
            | RemoteQuery::Skip { inner, .. }
            | RemoteQuery::SortBy { inner, .. } => inner.entity_name(),
        }
    }

    /// Direct predecessor, `None` for the base entity
    pub fn inner(&self) -> Option<&RemoteQuery> {
        match self {
            RemoteQuery::BaseEntity { .. } => None,
            RemoteQuery::ExpressionFilter { inner, .. }
            | RemoteQuery::ColumnsSelect { inner, .. }
            | RemoteQuery::Take { inner, .. }
            | RemoteQuery::Skip { inner, .. }
            | RemoteQuery::SortBy { inner, .. } => Some(inner),
        }
    }

    /// Node tag, as written to the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteQuery::BaseEntity { .. } => "BaseEntity",
            RemoteQuery::ExpressionFilter { .. } => "ExpressionFilter",
            RemoteQuery::ColumnsSelect { .. } => "ColumnsSelect",
            RemoteQuery::Take { .. } => "Take",
            RemoteQuery::Skip { .. } => "Skip",
            RemoteQuery::SortBy { .. } => "SortBy",
        }
    }

    /// Nodes in application order, base entity first
    pub fn nodes(&self) -> Vec<&RemoteQuery> {
        let mut out = Vec::new();
        let mut current = Some(self);
        while let Some(node) = current {
            out.push(node);
            current = node.inner();
        }
        out.reverse();
        out
    }

    /// True when some node narrows rows to a column subset
    pub fn is_projected(&self) -> bool {
        self.selected_columns().is_some()
    }

    /// Columns of the outermost `ColumnsSelect`, which decide the shape of
    /// every returned row
    pub fn selected_columns(&self) -> Option<&[String]> {
        let mut current = Some(self);
        while let Some(node) = current {
            if let RemoteQuery::ColumnsSelect { columns, .. } = node {
                return Some(columns);
            }
            current = node.inner();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RemoteQuery {
        RemoteQuery::Take {
            count: 2,
            inner: Box::new(RemoteQuery::SortBy {
                keys: vec![SortKey::asc("name"), SortKey::desc("age")],
                inner: Box::new(RemoteQuery::BaseEntity {
                    name: "Person".into(),
                }),
            }),
        }
    }

    #[test]
    fn test_document_shape() {
        assert_eq!(
            serde_json::to_value(sample()).unwrap(),
            json!({
                "type": "Take",
                "count": 2,
                "inner": {
                    "type": "SortBy",
                    "keys": [
                        {"fieldName": "name", "ascending": true},
                        {"fieldName": "age", "ascending": false}
                    ],
                    "inner": {"type": "BaseEntity", "name": "Person"}
                }
            })
        );
    }

    #[test]
    fn test_parse_back() {
        let text = serde_json::to_string(&sample()).unwrap();
        let parsed: RemoteQuery = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.entity_name(), "Person");
        let kinds: Vec<_> = parsed.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["BaseEntity", "SortBy", "Take"]);
        assert!(!parsed.is_projected());
    }

    #[test]
    fn test_outermost_select_wins() {
        let query = RemoteQuery::Take {
            count: 1,
            inner: Box::new(RemoteQuery::ColumnsSelect {
                columns: vec!["name".into()],
                inner: Box::new(RemoteQuery::ColumnsSelect {
                    columns: vec!["name".into(), "age".into()],
                    inner: Box::new(RemoteQuery::BaseEntity {
                        name: "Person".into(),
                    }),
                }),
            }),
        };
        assert_eq!(query.selected_columns(), Some(&["name".to_string()][..]));
        assert_eq!(sample().selected_columns(), None);
    }
}
