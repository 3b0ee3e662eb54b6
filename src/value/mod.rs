//! Values flowing through cursor pipelines
//!
//! Rows cross the remote boundary as JSON. Full rows are materialized into
//! typed `Entity` values; projected rows become untyped `Record`s.

mod compare;
mod entity;

pub use compare::{filter_cmp, filter_eq, total_cmp};
pub use entity::Entity;

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::query::{QueryError, QueryResult};

/// Partial record: field name -> value, without entity typing
pub type Record = BTreeMap<String, Value>;

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Partial projection or untyped object
    Record(Record),
    /// Fully materialized entity
    Entity(Entity),
}

impl Value {
    /// Structural conversion from JSON, without any descriptor.
    ///
    /// Objects become records; strings stay strings even when they look
    /// like dates.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to JSON. Dates render as RFC 3339, bytes as base64.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Bytes(b) => JsonValue::String(BASE64.encode(b)),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => record_to_json(record),
            Value::Entity(entity) => record_to_json(entity.fields()),
        }
    }

    /// Kind name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Entity(_) => "entity",
        }
    }

    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reads a field of an entity or record.
    ///
    /// - entity: unset fields read as `None`
    /// - record: a missing field was projected away and is an error
    /// - anything else has no fields
    pub fn field(&self, name: &str) -> QueryResult<Option<&Value>> {
        match self {
            Value::Entity(entity) => Ok(entity.get(name)),
            Value::Record(record) => record
                .get(name)
                .map(Some)
                .ok_or_else(|| QueryError::FieldNotSelected(name.to_string())),
            other => Err(QueryError::InvalidOperation(format!(
                "cannot read field '{}' of a {} value",
                name,
                other.kind_name()
            ))),
        }
    }

    /// Returns the entity, if this is one
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the record, if this is one
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the number, if this is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn record_to_json(record: &Record) -> JsonValue {
    JsonValue::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Parses RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` (UTC assumed), or `YYYY-MM-DD`.
pub(crate) fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Epoch milliseconds to a date; `None` for non-finite or out-of-range input
pub(crate) fn date_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Value::Entity(e)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_shape() {
        let v = Value::from_json(json!({"a": 1, "b": [true, null], "c": "x"}));
        let record = v.as_record().unwrap();
        assert_eq!(record.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(v.to_json(), json!({"a": 1, "b": [true, null], "c": "x"}));
    }

    #[test]
    fn test_field_access_rules() {
        let entity = Value::Entity(Entity::new("Foo").with("a", 1.0));
        assert_eq!(entity.field("b").unwrap(), None);

        let record = Value::from_json(json!({"a": 1}));
        assert!(matches!(
            record.field("b"),
            Err(QueryError::FieldNotSelected(f)) if f == "b"
        ));

        assert!(matches!(
            Value::Number(1.0).field("a"),
            Err(QueryError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_date_and_bytes_render() {
        let d = parse_date_str("2021-05-04").unwrap();
        assert_eq!(
            Value::Date(d).to_json(),
            json!("2021-05-04T00:00:00.000Z")
        );
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_json(), json!("AQID"));
    }

    #[test]
    fn test_date_from_millis() {
        let d = date_from_millis(0.0).unwrap();
        assert_eq!(d.timestamp(), 0);
        assert!(date_from_millis(f64::NAN).is_none());
    }
}
