//! Engine configuration
//!
//! Loaded from a JSON file; every field is optional:
//!
//! ```json
//! {
//!   "logLevel": "info",
//!   "pushdown": {
//!     "pushTake": true,
//!     "pushSkip": true,
//!     "pushProject": true,
//!     "pushExpressionFilter": true,
//!     "maxPushedSorts": 1,
//!     "stopAfterLimit": false
//!   }
//! }
//! ```

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};
use crate::query::PushdownPolicy;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Which operators the remote engine receives
    #[serde(default)]
    pub pushdown: PushdownPolicy,

    /// Minimum severity written by the logger (default "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pushdown: PushdownPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pushdown.max_pushed_sorts > 1 {
            return Err(ConfigError::Invalid(format!(
                "maxPushedSorts must be 0 or 1, got {}",
                self.pushdown.max_pushed_sorts
            )));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed log level
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// Applies the log level to the process-wide logger
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_threshold(self.severity()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let file = write_config("{}");
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_partial_pushdown_section() {
        let file = write_config(r#"{"logLevel": "trace", "pushdown": {"pushTake": false}}"#);
        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.pushdown.push_take);
        assert!(config.pushdown.push_skip);
        assert_eq!(config.pushdown.max_pushed_sorts, 1);
        assert_eq!(config.severity().unwrap(), Severity::Trace);
    }

    #[test]
    fn test_rejects_two_pushed_sorts() {
        let file = write_config(r#"{"pushdown": {"maxPushedSorts": 2}}"#);
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let file = write_config(r#"{"logLevel": "loud"}"#);
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "ENTIQ_CONFIG_INVALID");
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let err = EngineConfig::load(Path::new("/nonexistent/entiq.json")).unwrap_err();
        assert_eq!(err.code(), "ENTIQ_CONFIG_READ");

        let file = write_config("{not json");
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
