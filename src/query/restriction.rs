//! Filter objects
//!
//! Two declarative filter forms compile into an expression tree:
//! - `Restriction`: field equality, where unset (`None`) entries are skipped
//! - filter documents: JSON with `$and`, `$or`, `$not` and per-field
//!   `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$like`, `$notLike`
//!
//! A restriction that ends up empty compiles to `None`, which leaves the
//! cursor untouched. An empty `$or` matches nothing; an `$or` with an empty
//! branch matches everything.

use serde_json::{Map, Value as JsonValue};

use super::errors::{QueryError, QueryResult};
use super::expr::{BinaryOp, Expr, Literal};
use crate::value::Value;

/// Maximum nesting of a filter document
pub const MAX_FILTER_DEPTH: usize = 100;

/// Field equality restriction
#[derive(Debug, Clone, Default)]
pub struct Restriction {
    entries: Vec<(String, Option<Value>)>,
}

impl Restriction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field == value`
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((field.into(), Some(value.into())));
        self
    }

    /// Requires `field == value` when a value is given, otherwise nothing
    pub fn maybe(mut self, field: impl Into<String>, value: Option<Value>) -> Self {
        self.entries.push((field.into(), value));
        self
    }

    /// Fields carrying a value
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.as_str())
    }

    /// Conjunction of the set equalities, `None` if nothing is set
    pub fn to_expr(&self) -> QueryResult<Option<Expr>> {
        let mut conjuncts = Vec::new();
        for (field, value) in &self.entries {
            if let Some(value) = value {
                conjuncts.push(Expr::eq(
                    Expr::property(field.clone()),
                    Expr::Value {
                        value: Literal::from_value(value)?,
                    },
                ));
            }
        }
        Ok(conjunction(conjuncts))
    }
}

impl FromIterator<(String, Option<Value>)> for Restriction {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn conjunction(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(Expr::and)
}

/// Compiles a filter document into an expression, `None` for `{}`
pub fn compile_filter(document: &JsonValue) -> QueryResult<Option<Expr>> {
    match document {
        JsonValue::Object(map) => compile_object(map, &[], 1),
        other => Err(QueryError::InvalidFilter(format!(
            "filter must be an object, got {}",
            other
        ))),
    }
}

fn check_depth(depth: usize) -> QueryResult<()> {
    if depth > MAX_FILTER_DEPTH {
        return Err(QueryError::InvalidFilter(format!(
            "filter nested deeper than {} levels",
            MAX_FILTER_DEPTH
        )));
    }
    Ok(())
}

/// Compiles the conditions of one object level. `path` is the field path
/// the object is nested under, empty at the top.
fn compile_object(
    map: &Map<String, JsonValue>,
    path: &[String],
    depth: usize,
) -> QueryResult<Option<Expr>> {
    check_depth(depth)?;

    let mut conjuncts = Vec::new();
    for (key, value) in map {
        let compiled = match key.as_str() {
            "$and" | "$or" => {
                let items = value.as_array().ok_or_else(|| {
                    QueryError::InvalidFilter(format!("{} expects an array", key))
                })?;
                let mut parts = Vec::with_capacity(items.len());
                let mut any_empty = false;
                for item in items {
                    let object = item.as_object().ok_or_else(|| {
                        QueryError::InvalidFilter(format!("{} items must be objects", key))
                    })?;
                    match compile_object(object, path, depth + 1)? {
                        Some(expr) => parts.push(expr),
                        None => any_empty = true,
                    }
                }
                if key == "$and" {
                    conjunction(parts)
                } else if any_empty {
                    // One always-true branch makes the disjunction true
                    None
                } else {
                    // An empty disjunction matches nothing
                    Some(
                        parts
                            .into_iter()
                            .reduce(Expr::or)
                            .unwrap_or_else(|| Expr::literal(false)),
                    )
                }
            }
            "$not" => {
                let object = value.as_object().ok_or_else(|| {
                    QueryError::InvalidFilter("$not expects an object".to_string())
                })?;
                Some(
                    compile_object(object, path, depth + 1)?
                        .map_or_else(|| Expr::literal(false), Expr::not),
                )
            }
            op if op.starts_with('$') => {
                if path.is_empty() {
                    return Err(QueryError::InvalidFilter(format!(
                        "{} must be applied to a field",
                        op
                    )));
                }
                Some(comparison(op, Expr::path(path), value)?)
            }
            field => {
                let mut nested = path.to_vec();
                nested.push(field.to_string());
                compile_field(&nested, value, depth + 1)?
            }
        };
        if let Some(expr) = compiled {
            conjuncts.push(expr);
        }
    }
    Ok(conjunction(conjuncts))
}

fn compile_field(path: &[String], value: &JsonValue, depth: usize) -> QueryResult<Option<Expr>> {
    check_depth(depth)?;
    match value {
        JsonValue::Object(map) => compile_object(map, path, depth),
        JsonValue::Array(_) => Err(QueryError::InvalidFilter(format!(
            "array value for field '{}' is not supported",
            path.join(".")
        ))),
        scalar => Ok(Some(Expr::eq(
            Expr::path(path),
            Expr::Value {
                value: Literal::from_json(scalar)?,
            },
        ))),
    }
}

fn comparison(op: &str, target: Expr, value: &JsonValue) -> QueryResult<Expr> {
    let op = match op {
        "$eq" => BinaryOp::Eq,
        "$ne" => BinaryOp::NotEq,
        "$gt" => BinaryOp::Gt,
        "$gte" => BinaryOp::GtEq,
        "$lt" => BinaryOp::Lt,
        "$lte" => BinaryOp::LtEq,
        "$like" => BinaryOp::Like,
        "$notLike" => BinaryOp::NotLike,
        other => {
            return Err(QueryError::InvalidFilter(format!(
                "unknown operator {}",
                other
            )))
        }
    };
    Ok(Expr::binary(
        op,
        target,
        Expr::Value {
            value: Literal::from_json(value)?,
        },
    ))
}
