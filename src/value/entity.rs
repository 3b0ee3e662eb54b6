//! Typed entity instances produced by the materializer

use std::collections::BTreeMap;

use super::{Record, Value};

/// A materialized entity: its descriptor name plus validated field values.
///
/// Fields absent from the source row are absent here too; `get` returns
/// `None` for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    name: String,
    fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an entity with no fields set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `id` field, when present and textual
    pub fn id(&self) -> Option<&str> {
        match self.fields.get("id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        }
    }

    /// Returns a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a mutable field value
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Sets a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style `set`
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value.into());
        self
    }

    /// All set fields
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Restricts the entity to `columns`, producing a partial record.
    ///
    /// Unset columns are carried as null so later reads still find them.
    pub fn project(&self, columns: &[String]) -> Record {
        columns
            .iter()
            .map(|c| (c.clone(), self.fields.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// Drops the entity name, keeping the fields as a record
    pub fn into_record(self) -> Record {
        self.fields
    }
}
