//! Value comparison
//!
//! Two orderings live here:
//! - `total_cmp`: total order used by sort and min/max folds.
//!   null < bool < number < string < date < bytes < array < record < entity,
//!   natural order within a kind.
//! - `filter_cmp`: partial order used by filter expressions. Only values of
//!   the same kind compare, except dates, which also compare against RFC 3339
//!   strings and epoch-millisecond numbers.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::Value;

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Date(_) => 4,
        Value::Bytes(_) => 5,
        Value::Array(_) => 6,
        Value::Record(_) => 7,
        Value::Entity(_) => 8,
    }
}

/// Total order over values.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = total_cmp(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Record(x), Value::Record(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| total_cmp(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Entity(x), Value::Entity(y)) => x.id().cmp(&y.id()),
        _ => Ordering::Equal,
    }
}

/// Partial order used by filter comparisons.
///
/// Returns `None` when the values are not comparable; comparison operators
/// then evaluate to false.
pub fn filter_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Date(x), other) => coerce_date(other).map(|y| x.cmp(&y)),
        (other, Value::Date(y)) => coerce_date(other).map(|x| x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Array(_), Value::Array(_))
        | (Value::Record(_), Value::Record(_))
        | (Value::Entity(_), Value::Entity(_)) => {
            if a == b {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Filter equality: same-kind equality plus date coercion.
pub fn filter_eq(a: &Value, b: &Value) -> bool {
    filter_cmp(a, b) == Some(Ordering::Equal)
}

fn coerce_date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => super::parse_date_str(s),
        Value::Number(ms) => super::date_from_millis(*ms),
        _ => None,
    }
}
