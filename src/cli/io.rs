//! JSON output for the CLI
//!
//! One JSON object per invocation on stdout:
//! - `{"status": "ok", "data": ...}`
//! - `{"status": "error", "code": ..., "message": ...}`

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Reads and parses a JSON input file
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::input(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::input(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_value(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_value(&serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}

fn write_value(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
