//! Configuration errors

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    /// File is not valid JSON for the config schema
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Parsed but violates a constraint
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "ENTIQ_CONFIG_READ",
            ConfigError::Parse(_) => "ENTIQ_CONFIG_PARSE",
            ConfigError::Invalid(_) => "ENTIQ_CONFIG_INVALID",
        }
    }
}
