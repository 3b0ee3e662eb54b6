//! CLI-specific error types

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::query::QueryError;
use crate::types::DescriptorError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Query script or data file unreadable or malformed
    #[error("{0}")]
    Input(String),

    /// Runtime or stdout failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    pub fn input(msg: impl Into<String>) -> Self {
        CliError::Input(msg.into())
    }

    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Descriptor(e) => e.code(),
            CliError::Query(e) => e.code(),
            CliError::Input(_) => "ENTIQ_CLI_INPUT",
            CliError::Io(_) => "ENTIQ_CLI_IO",
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}
