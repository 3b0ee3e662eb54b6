//! Descriptor registry errors
//!
//! All of these are startup failures: the registry is built once and never
//! mutated afterwards.

use thiserror::Error;

/// Result type for registry operations
pub type DescriptorResult<T> = Result<T, DescriptorError>;

/// Errors raised while building the type registry
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// Descriptor file unreadable or not valid JSON
    #[error("Malformed descriptor file '{path}': {reason}")]
    Malformed { path: String, reason: String },

    /// Descriptor violates its own structural rules
    #[error("Invalid descriptor: {0}")]
    Invalid(String),

    /// Entity registered twice
    #[error("Entity '{0}' is already registered")]
    Duplicate(String),

    /// Nested entity reference to an unregistered entity
    #[error("Entity '{entity}' field '{field}' references unknown entity '{target}'")]
    DanglingReference {
        entity: String,
        field: String,
        target: String,
    },

    /// Nested entity references form a cycle
    #[error("Entity references form a cycle through '{0}'")]
    Cycle(String),
}

impl DescriptorError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            DescriptorError::Malformed { .. } => "ENTIQ_DESCRIPTOR_MALFORMED",
            DescriptorError::Invalid(_) => "ENTIQ_DESCRIPTOR_INVALID",
            DescriptorError::Duplicate(_) => "ENTIQ_DESCRIPTOR_DUPLICATE",
            DescriptorError::DanglingReference { .. } => "ENTIQ_DESCRIPTOR_DANGLING",
            DescriptorError::Cycle(_) => "ENTIQ_DESCRIPTOR_CYCLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_reference_display() {
        let err = DescriptorError::DanglingReference {
            entity: "Person".into(),
            field: "home".into(),
            target: "Address".into(),
        };
        let display = err.to_string();
        assert!(display.contains("Person"));
        assert!(display.contains("home"));
        assert!(display.contains("Address"));
        assert_eq!(err.code(), "ENTIQ_DESCRIPTOR_DANGLING");
    }
}
