//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, then `severity`, then fields sorted by key
//! - Synchronous, no buffering
//! - Events below the process-wide threshold are dropped

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Split decisions and per-row detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Internal defects
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "INFO" => Ok(Severity::Info),
            "WARN" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "FATAL" => Ok(Severity::Fatal),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Severity::Warn as u8);
static CAPTURE: Mutex<Option<Vec<String>>> = Mutex::new(None);

/// A structured logger that outputs JSON lines
pub struct Logger;

impl Logger {
    /// Sets the minimum severity that gets written
    pub fn set_threshold(severity: Severity) {
        THRESHOLD.store(severity as u8, Ordering::Relaxed);
    }

    /// Returns the current minimum severity
    pub fn threshold() -> Severity {
        Severity::from_u8(THRESHOLD.load(Ordering::Relaxed))
    }

    /// Redirects all subsequent lines into an in-memory buffer.
    ///
    /// Used by tests to assert on emitted events.
    pub fn capture() {
        if let Ok(mut guard) = CAPTURE.lock() {
            *guard = Some(Vec::new());
        }
    }

    /// Stops capturing and returns the captured lines
    pub fn take_captured() -> Vec<String> {
        match CAPTURE.lock() {
            Ok(mut guard) => guard.take().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < Self::threshold() {
            return;
        }
        let line = Self::render(severity, event, fields);

        if let Ok(mut guard) = CAPTURE.lock() {
            if let Some(buffer) = guard.as_mut() {
                buffer.push(line);
                return;
            }
        }

        if severity >= Severity::Error {
            Self::write_line(&line, &mut io::stderr());
        } else {
            Self::write_line(&line, &mut io::stdout());
        }
    }

    fn write_line<W: Write>(line: &str, writer: &mut W) {
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.write_all(b"\n");
        let _ = writer.flush();
    }

    /// Renders one JSON line without the trailing newline
    pub(crate) fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(128);

        output.push_str("{\"event\":\"");
        Self::escape_json_string(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            Self::escape_json_string(&mut output, key);
            output.push_str("\":\"");
            Self::escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output
    }

    fn escape_json_string(output: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c.is_control() => {
                    output.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => output.push(c),
            }
        }
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_key_order() {
        let line = Logger::render(
            Severity::Info,
            "REMOTE_OPEN",
            &[("entity", "Foo"), ("ding", "x"), ("ops", "3")],
        );
        assert_eq!(
            line,
            r#"{"event":"REMOTE_OPEN","severity":"INFO","ding":"x","entity":"Foo","ops":"3"}"#
        );
    }

    #[test]
    fn test_render_escapes() {
        let line = Logger::render(Severity::Warn, "E", &[("reason", "a \"b\"\n")]);
        assert!(line.contains(r#""reason":"a \"b\"\n""#));
        assert!(serde_json::from_str::<serde_json::Value>(&line).is_ok());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("trace".parse::<Severity>().unwrap(), Severity::Trace);
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Error < Severity::Fatal);
    }
}
