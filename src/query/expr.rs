//! Filter expression trees
//!
//! Wire shape (tag `exprType`):
//! - `Binary { left, op, right }`
//! - `Property { object, property }`
//! - `Parameter { position }` (position 0 is the element being filtered)
//! - `Value { value }` (JSON literal)
//! - `Not { value }`
//!
//! The same tree is evaluated in-process when the filter does not get
//! pushed to the remote engine.

use std::borrow::Cow;
use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::errors::{QueryError, QueryResult};
use crate::value::{filter_cmp, filter_eq, Value};

/// Literal operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    String(String),
    Null,
}

impl Literal {
    /// Converts a scalar JSON value; arrays and objects are not literals
    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        match json {
            JsonValue::Null => Ok(Literal::Null),
            JsonValue::Bool(b) => Ok(Literal::Bool(*b)),
            JsonValue::Number(n) => n
                .as_f64()
                .map(Literal::Number)
                .ok_or_else(|| QueryError::InvalidFilter(format!("unrepresentable number {}", n))),
            JsonValue::String(s) => Ok(Literal::String(s.clone())),
            other => Err(QueryError::InvalidFilter(format!(
                "expected a scalar literal, got {}",
                other
            ))),
        }
    }

    /// Converts a scalar value; dates become RFC 3339 strings
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Date(_) => Literal::from_json(&value.to_json()),
            Value::Null => Ok(Literal::Null),
            Value::Bool(b) => Ok(Literal::Bool(*b)),
            Value::Number(n) => Ok(Literal::Number(*n)),
            Value::String(s) => Ok(Literal::String(s.clone())),
            other => Err(QueryError::InvalidFilter(format!(
                "expected a scalar literal, got a {}",
                other.kind_name()
            ))),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Null => Value::Null,
        }
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Number(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Number(v as f64)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(v)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Like,
    NotLike,
}

impl BinaryOp {
    /// Operator symbol for display
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
        }
    }
}

/// `object.property`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAccess {
    pub object: Box<Expr>,
    pub property: String,
}

/// `left op right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: BinaryOp,
    pub right: Box<Expr>,
}

/// Filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "exprType")]
pub enum Expr {
    Value { value: Literal },
    Property(PropertyAccess),
    Parameter { position: usize },
    Binary(BinaryExpr),
    Not { value: Box<Expr> },
}

impl Expr {
    /// The filtered element itself
    pub fn element() -> Self {
        Expr::Parameter { position: 0 }
    }

    /// `element.name`
    pub fn property(name: impl Into<String>) -> Self {
        Self::element().dot(name)
    }

    /// `element.a.b.c`
    pub fn path<S: AsRef<str>>(names: &[S]) -> Self {
        names
            .iter()
            .fold(Self::element(), |object, name| object.dot(name.as_ref()))
    }

    /// `self.name`
    pub fn dot(self, name: impl Into<String>) -> Self {
        Expr::Property(PropertyAccess {
            object: Box::new(self),
            property: name.into(),
        })
    }

    /// Literal operand
    pub fn literal(value: impl Into<Literal>) -> Self {
        Expr::Value {
            value: value.into(),
        }
    }

    /// Binary expression
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not {
            value: Box::new(inner),
        }
    }

    /// Top-level fields of the element this expression reads
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Expr::Property(access) => {
                if let Expr::Parameter { position: 0 } = access.object.as_ref() {
                    if !out.contains(&access.property) {
                        out.push(access.property.clone());
                    }
                } else {
                    access.object.collect_fields(out);
                }
            }
            Expr::Binary(b) => {
                b.left.collect_fields(out);
                b.right.collect_fields(out);
            }
            Expr::Not { value } => value.collect_fields(out),
            Expr::Value { .. } | Expr::Parameter { .. } => {}
        }
    }

    /// Evaluates the expression with `element` bound to parameter 0.
    ///
    /// LIKE patterns are compiled on every call; filters evaluated once per
    /// row go through [`Expr::compile`].
    pub fn eval<'a>(&self, element: &'a Value) -> QueryResult<Cow<'a, Value>> {
        self.eval_in(element, &LikePatterns::default())
    }

    /// Evaluates the expression as a predicate
    pub fn matches(&self, element: &Value) -> QueryResult<bool> {
        truthy(&*self.eval(element)?)
    }

    /// Compiles every literal LIKE pattern up front. A malformed pattern
    /// fails here instead of on the first row.
    pub fn compile(&self) -> QueryResult<CompiledExpr> {
        let mut patterns = LikePatterns::default();
        self.collect_patterns(&mut patterns)?;
        Ok(CompiledExpr {
            expr: self.clone(),
            patterns,
        })
    }

    fn collect_patterns(&self, patterns: &mut LikePatterns) -> QueryResult<()> {
        match self {
            Expr::Binary(b) => {
                if let (
                    OpClass::Like { .. },
                    Expr::Value {
                        value: Literal::String(pattern),
                    },
                ) = (b.op.class(), b.right.as_ref())
                {
                    patterns.insert(pattern)?;
                }
                b.left.collect_patterns(patterns)?;
                b.right.collect_patterns(patterns)
            }
            Expr::Property(access) => access.object.collect_patterns(patterns),
            Expr::Not { value } => value.collect_patterns(patterns),
            Expr::Value { .. } | Expr::Parameter { .. } => Ok(()),
        }
    }

    fn eval_in<'a>(
        &self,
        element: &'a Value,
        patterns: &LikePatterns,
    ) -> QueryResult<Cow<'a, Value>> {
        match self {
            Expr::Value { value } => Ok(Cow::Owned(value.to_value())),
            Expr::Parameter { position: 0 } => Ok(Cow::Borrowed(element)),
            Expr::Parameter { position } => Err(QueryError::InvalidFilter(format!(
                "unbound parameter {}",
                position
            ))),
            Expr::Property(access) => match access.object.eval_in(element, patterns)? {
                Cow::Borrowed(object) => Ok(object
                    .field(&access.property)?
                    .map(Cow::Borrowed)
                    .unwrap_or(Cow::Owned(Value::Null))),
                Cow::Owned(object) => Ok(Cow::Owned(
                    object.field(&access.property)?.cloned().unwrap_or(Value::Null),
                )),
            },
            Expr::Not { value } => Ok(Cow::Owned(Value::Bool(!truthy(
                &*value.eval_in(element, patterns)?,
            )?))),
            Expr::Binary(b) => {
                let left = || b.left.eval_in(element, patterns);
                let right = || b.right.eval_in(element, patterns);
                let result = match b.op.class() {
                    OpClass::And => truthy(&*left()?)? && truthy(&*right()?)?,
                    OpClass::Or => truthy(&*left()?)? || truthy(&*right()?)?,
                    OpClass::Like { negated } => {
                        let matched = match (&*left()?, &*right()?) {
                            (Value::String(text), Value::String(pattern)) => {
                                patterns.is_match(pattern, text)?
                            }
                            _ => false,
                        };
                        matched != negated
                    }
                    OpClass::Compare(op) => op.apply(&*left()?, &*right()?),
                };
                Ok(Cow::Owned(Value::Bool(result)))
            }
        }
    }
}

/// An expression with its LIKE patterns compiled, ready for per-row use
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    expr: Expr,
    patterns: LikePatterns,
}

impl CompiledExpr {
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates the expression as a predicate
    pub fn matches(&self, element: &Value) -> QueryResult<bool> {
        truthy(&*self.expr.eval_in(element, &self.patterns)?)
    }

    /// Number of distinct patterns compiled ahead of evaluation
    pub fn pattern_count(&self) -> usize {
        self.patterns.0.len()
    }
}

fn truthy(value: &Value) -> QueryResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(QueryError::InvalidFilter(format!(
            "expected a boolean condition, got a {}",
            other.kind_name()
        ))),
    }
}

/// How a binary operator is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpClass {
    And,
    Or,
    Like { negated: bool },
    Compare(CmpOp),
}

/// Value comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    fn class(self) -> OpClass {
        match self {
            BinaryOp::And => OpClass::And,
            BinaryOp::Or => OpClass::Or,
            BinaryOp::Like => OpClass::Like { negated: false },
            BinaryOp::NotLike => OpClass::Like { negated: true },
            BinaryOp::Eq => OpClass::Compare(CmpOp::Eq),
            BinaryOp::NotEq => OpClass::Compare(CmpOp::NotEq),
            BinaryOp::Lt => OpClass::Compare(CmpOp::Lt),
            BinaryOp::LtEq => OpClass::Compare(CmpOp::LtEq),
            BinaryOp::Gt => OpClass::Compare(CmpOp::Gt),
            BinaryOp::GtEq => OpClass::Compare(CmpOp::GtEq),
        }
    }
}

impl CmpOp {
    fn apply(self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::*;

        match self {
            CmpOp::Eq => filter_eq(left, right),
            CmpOp::NotEq => !filter_eq(left, right),
            CmpOp::Lt => filter_cmp(left, right) == Some(Less),
            CmpOp::LtEq => matches!(filter_cmp(left, right), Some(Less | Equal)),
            CmpOp::Gt => filter_cmp(left, right) == Some(Greater),
            CmpOp::GtEq => matches!(filter_cmp(left, right), Some(Greater | Equal)),
        }
    }
}

/// Compiled LIKE patterns keyed by their source text
#[derive(Debug, Clone, Default)]
struct LikePatterns(HashMap<String, Regex>);

impl LikePatterns {
    fn insert(&mut self, pattern: &str) -> QueryResult<()> {
        if !self.0.contains_key(pattern) {
            self.0.insert(pattern.to_string(), like_regex(pattern)?);
        }
        Ok(())
    }

    /// Patterns computed at run time are not in the map and compile here
    fn is_match(&self, pattern: &str, text: &str) -> QueryResult<bool> {
        match self.0.get(pattern) {
            Some(re) => Ok(re.is_match(text)),
            None => Ok(like_regex(pattern)?.is_match(text)),
        }
    }
}

/// Translates a SQL LIKE pattern (`%` any run, `_` one char) into an
/// anchored regex.
fn like_regex(pattern: &str) -> QueryResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| QueryError::InvalidFilter(format!("bad LIKE pattern: {}", e)))
}
