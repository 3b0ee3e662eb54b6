//! ObservationScope for start/complete logging around one cursor iteration
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when finished explicitly
//! - Logs `{name}_INCOMPLETE` on drop otherwise

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the lifecycle of one unit of work.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("CURSOR_ITERATION", &[("entity", "Foo")]);
/// // ... pull rows ...
/// scope.complete_with_fields(&[("rows", "2")]);
/// ```
pub struct ObservationScope {
    name: &'static str,
    completed: bool,
    fields: Vec<(&'static str, String)>,
    started_at: Instant,
}

impl ObservationScope {
    /// Create a new observation scope
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Create a new observation scope carrying fields on every line it logs
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        let scope = Self {
            name,
            completed: false,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started_at: Instant::now(),
        };
        Logger::info(&format!("{}_BEGIN", name), &scope.field_refs());
        scope
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as successfully completed with additional fields
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.started_at.elapsed().as_micros().to_string();
        let mut all_fields = self.field_refs();
        all_fields.extend(extra_fields.iter().copied());
        all_fields.push(("elapsed_us", &elapsed));
        Logger::info(&format!("{}_COMPLETE", self.name), &all_fields);
    }

    /// Mark the scope as failed with a reason
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        let mut all_fields = self.field_refs();
        all_fields.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &all_fields);
    }

    /// Mark the scope as failed because of an internal defect
    pub fn fail_fatal(mut self, reason: &str) {
        self.completed = true;
        let mut all_fields = self.field_refs();
        all_fields.push(("reason", reason));
        Logger::fatal(&format!("{}_FAILED", self.name), &all_fields);
    }

    /// Check if the scope has been completed
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            let mut all_fields = self.field_refs();
            all_fields.push(("reason", "scope dropped without completion"));
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &all_fields);
        }
    }
}
