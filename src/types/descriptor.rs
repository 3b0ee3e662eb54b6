//! Entity type descriptors
//!
//! Field kinds:
//! - string, number, boolean
//! - date: accepts RFC 3339 strings or epoch milliseconds on read
//! - bytes: accepts byte arrays or base64 text on read
//! - array: homogeneous, with an element kind
//! - entity: reference to another registered entity, stored nested

use serde::{Deserialize, Serialize};

/// Declared kind of an entity field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Bytes,
    /// Homogeneous array
    Array {
        /// Element kind (boxed for recursion)
        element: Box<FieldKind>,
    },
    /// Nested entity, resolved against its own descriptor
    Entity {
        /// Name of the nested entity
        entity: String,
    },
}

impl FieldKind {
    /// Returns the kind name for error messages
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::String => "string".into(),
            FieldKind::Number => "number".into(),
            FieldKind::Boolean => "boolean".into(),
            FieldKind::Date => "date".into(),
            FieldKind::Bytes => "bytes".into(),
            FieldKind::Array { element } => format!("array<{}>", element.type_name()),
            FieldKind::Entity { entity } => entity.clone(),
        }
    }

    /// Shorthand for an array kind
    pub fn array_of(element: FieldKind) -> Self {
        FieldKind::Array {
            element: Box::new(element),
        }
    }

    /// Shorthand for a nested entity kind
    pub fn entity(name: impl Into<String>) -> Self {
        FieldKind::Entity {
            entity: name.into(),
        }
    }

    /// Names of the entities this kind refers to, directly or through arrays
    pub(crate) fn referenced_entity(&self) -> Option<&str> {
        match self {
            FieldKind::Entity { entity } => Some(entity),
            FieldKind::Array { element } => element.referenced_entity(),
            _ => None,
        }
    }
}

/// One declared field of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Declared kind
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Whether null is an acceptable value
    #[serde(default)]
    pub is_optional: bool,
    /// Whether values are unique across the entity's rows
    #[serde(default)]
    pub is_unique: bool,
}

impl FieldDescriptor {
    /// Create a required field
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_optional: false,
            is_unique: false,
        }
    }

    /// Create an optional field
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            is_optional: true,
            ..Self::required(name, kind)
        }
    }

    /// Mark the field unique
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }
}

/// Descriptor of one entity: its name and ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity name as used by `Scan`
    pub name: String,
    /// Declared fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the entity declares `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Validates the descriptor itself: non-empty name, no duplicate fields.
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("entity name must not be empty".into());
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(format!("entity '{}' has a field without a name", self.name));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(format!(
                    "entity '{}' declares field '{}' twice",
                    self.name, field.name
                ));
            }
        }
        Ok(())
    }
}
