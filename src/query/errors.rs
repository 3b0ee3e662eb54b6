//! Query error types
//!
//! Error codes:
//! - ENTIQ_TYPE_MISMATCH
//! - ENTIQ_UNKNOWN_ENTITY
//! - ENTIQ_INTERNAL_CONSISTENCY (defect)
//! - ENTIQ_REMOTE_CHANNEL
//! - ENTIQ_FIELD_NOT_SELECTED
//! - ENTIQ_INVALID_FILTER
//! - ENTIQ_INVALID_OPERATION

use thiserror::Error;

use crate::remote::ChannelError;

/// Result type for cursor operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors surfaced by terminal cursor operations
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Field value disagrees with its declared kind or optionality
    #[error("Type mismatch on {entity}.{field}: expected {expected}, got {actual}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// Entity absent from the type registry
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Chain or descriptor structure broken; a defect, not bad input
    #[error("Internal consistency failure: {0}")]
    InternalConsistency(String),

    /// Failure reported by the remote query channel
    #[error("{0}")]
    Remote(#[from] ChannelError),

    /// Field read from a partial record that does not carry it
    #[error("Field '{0}' is not part of the selected columns")]
    FieldNotSelected(String),

    /// Malformed filter document or expression
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Operation applied to a value that cannot support it
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl QueryError {
    /// Builds a type mismatch, rendering the offending value as JSON
    pub(crate) fn type_mismatch(
        entity: &str,
        field: &str,
        expected: impl Into<String>,
        actual: &serde_json::Value,
    ) -> Self {
        QueryError::TypeMismatch {
            entity: entity.to_string(),
            field: field.to_string(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::TypeMismatch { .. } => "ENTIQ_TYPE_MISMATCH",
            QueryError::UnknownEntity(_) => "ENTIQ_UNKNOWN_ENTITY",
            QueryError::InternalConsistency(_) => "ENTIQ_INTERNAL_CONSISTENCY",
            QueryError::Remote(_) => "ENTIQ_REMOTE_CHANNEL",
            QueryError::FieldNotSelected(_) => "ENTIQ_FIELD_NOT_SELECTED",
            QueryError::InvalidFilter(_) => "ENTIQ_INVALID_FILTER",
            QueryError::InvalidOperation(_) => "ENTIQ_INVALID_OPERATION",
        }
    }

    /// Returns true when the error signals a defect in chain construction or
    /// descriptors rather than bad input
    pub fn is_defect(&self) -> bool {
        matches!(self, QueryError::InternalConsistency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_mismatch_names_everything() {
        let err = QueryError::type_mismatch("Foo", "count", "number", &json!(null));
        let display = err.to_string();
        assert!(display.contains("Foo"));
        assert!(display.contains("count"));
        assert!(display.contains("null"));
        assert_eq!(err.code(), "ENTIQ_TYPE_MISMATCH");
    }

    #[test]
    fn test_defect_classification() {
        assert!(QueryError::InternalConsistency("x".into()).is_defect());
        assert!(!QueryError::UnknownEntity("Foo".into()).is_defect());
    }

    #[test]
    fn test_remote_error_verbatim() {
        let err: QueryError = ChannelError::Open("connection refused".into()).into();
        assert_eq!(err.to_string(), ChannelError::Open("connection refused".into()).to_string());
    }
}
