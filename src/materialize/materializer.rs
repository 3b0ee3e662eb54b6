//! Entity Materializer
//!
//! Converts raw remote rows into typed entities, checking each declared
//! field against the registry:
//! - `id` is copied verbatim
//! - null only for optional fields
//! - primitives must match their kind exactly
//! - bytes: JSON byte array or base64 text
//! - dates: RFC 3339 / `YYYY-MM-DD` text or epoch milliseconds
//! - arrays element-wise, nested entities recursively
//!
//! Row keys the descriptor does not declare are ignored.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value as JsonValue};

use crate::query::{QueryError, QueryResult};
use crate::remote::RawRow;
use crate::types::{EntityDescriptor, FieldKind, TypeRegistry};
use crate::value::{date_from_millis, parse_date_str, Entity, Value};

const ID_FIELD: &str = "id";

/// Row-to-entity converter bound to one registry
#[derive(Debug, Clone)]
pub struct Materializer {
    registry: Arc<TypeRegistry>,
}

impl Materializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Builds a fresh entity of type `entity` from `row`
    pub fn materialize(&self, entity: &str, row: &RawRow) -> QueryResult<Entity> {
        let descriptor = self
            .registry
            .get(entity)
            .ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))?;
        let mut out = Entity::new(entity);
        self.fill(&mut out, descriptor, row, false)?;
        Ok(out)
    }

    /// Applies `row` onto an existing entity. Nested entities already
    /// present are updated in place rather than replaced.
    pub fn merge(&self, target: &mut Entity, row: &RawRow) -> QueryResult<()> {
        let descriptor = self
            .registry
            .get(target.name())
            .ok_or_else(|| QueryError::UnknownEntity(target.name().to_string()))?;
        self.fill(target, descriptor, row, true)
    }

    /// Output element for one row: a partial record holding exactly
    /// `columns` when the remote side projected, otherwise a typed entity.
    ///
    /// Selected columns the row omits come out as null, the same as a local
    /// projection of an unset field.
    pub fn to_output(
        &self,
        entity: &str,
        mut row: RawRow,
        columns: Option<&[String]>,
    ) -> QueryResult<Value> {
        match columns {
            Some(columns) => {
                let record: RawRow = columns
                    .iter()
                    .map(|c| (c.clone(), row.remove(c).unwrap_or(JsonValue::Null)))
                    .collect();
                Ok(Value::from_json(JsonValue::Object(record)))
            }
            None => self.materialize(entity, &row).map(Value::Entity),
        }
    }

    fn nested(&self, name: &str) -> QueryResult<&EntityDescriptor> {
        self.registry.get(name).ok_or_else(|| {
            QueryError::InternalConsistency(format!(
                "nested entity '{}' is not registered",
                name
            ))
        })
    }

    fn fill(
        &self,
        target: &mut Entity,
        descriptor: &EntityDescriptor,
        row: &Map<String, JsonValue>,
        merging: bool,
    ) -> QueryResult<()> {
        if let Some(id) = row.get(ID_FIELD) {
            target.set(ID_FIELD, Value::from_json(id.clone()));
        }

        for field in &descriptor.fields {
            if field.name == ID_FIELD {
                continue;
            }
            let Some(raw) = row.get(&field.name) else {
                continue;
            };

            if merging {
                if let (FieldKind::Entity { entity }, JsonValue::Object(nested_row)) =
                    (&field.kind, raw)
                {
                    if let Some(Value::Entity(existing)) = target.get_mut(&field.name) {
                        let nested = self.nested(entity)?;
                        self.fill(existing, nested, nested_row, true)?;
                        continue;
                    }
                }
            }

            let value = self.convert(
                &descriptor.name,
                &field.name,
                &field.kind,
                field.is_optional,
                raw,
            )?;
            target.set(field.name.clone(), value);
        }
        Ok(())
    }

    fn convert(
        &self,
        entity: &str,
        field: &str,
        kind: &FieldKind,
        optional: bool,
        raw: &JsonValue,
    ) -> QueryResult<Value> {
        let mismatch = || QueryError::type_mismatch(entity, field, kind.type_name(), raw);

        if raw.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(mismatch())
            };
        }

        match kind {
            FieldKind::String => raw
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            FieldKind::Number => raw.as_f64().map(Value::Number).ok_or_else(mismatch),
            FieldKind::Boolean => raw.as_bool().map(Value::Bool).ok_or_else(mismatch),
            FieldKind::Date => match raw {
                JsonValue::String(s) => parse_date_str(s).map(Value::Date).ok_or_else(mismatch),
                JsonValue::Number(n) => n
                    .as_f64()
                    .and_then(date_from_millis)
                    .map(Value::Date)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            FieldKind::Bytes => match raw {
                JsonValue::String(s) => BASE64
                    .decode(s)
                    .map(Value::Bytes)
                    .map_err(|_| mismatch()),
                JsonValue::Array(items) => items
                    .iter()
                    .map(|b| {
                        b.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(mismatch)
                    })
                    .collect::<QueryResult<Vec<u8>>>()
                    .map(Value::Bytes),
                _ => Err(mismatch()),
            },
            FieldKind::Array { element } => {
                let items = raw.as_array().ok_or_else(mismatch)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.convert(entity, &format!("{}[{}]", field, i), element, false, item)
                    })
                    .collect::<QueryResult<Vec<Value>>>()
                    .map(Value::Array)
            }
            FieldKind::Entity { entity: nested } => {
                let nested_row = raw.as_object().ok_or_else(mismatch)?;
                let descriptor = self.nested(nested)?;
                let mut out = Entity::new(nested.clone());
                self.fill(&mut out, descriptor, nested_row, false)?;
                Ok(Value::Entity(out))
            }
        }
    }
}
