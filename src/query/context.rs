//! Request Context
//!
//! Context handed to every terminal cursor operation and forwarded to the
//! remote channel when a query is opened.

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

/// Context carried from the caller down to the remote channel
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// Data version the query should observe, if pinned
    pub version_id: Option<u64>,

    /// Authenticated user, if any
    pub user_id: Option<Uuid>,

    /// Originating request path
    pub path: String,

    /// Originating request method
    pub method: String,

    /// Request headers forwarded to the remote engine
    pub headers: HashMap<String, String>,

    /// Start time for duration tracking
    started_at: Instant,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            version_id: None,
            user_id: None,
            path: path.into(),
            method: method.into(),
            headers: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Context for queries not tied to an inbound request
    pub fn internal() -> Self {
        Self::new("INTERNAL", "/")
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_version(mut self, version_id: u64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let user = Uuid::new_v4();
        let ctx = RequestContext::new("GET", "/items")
            .with_user(user)
            .with_version(7)
            .with_header("x-tenant", "acme");

        assert_eq!(ctx.user_id, Some(user));
        assert_eq!(ctx.version_id, Some(7));
        assert_eq!(ctx.headers.get("x-tenant").map(String::as_str), Some("acme"));
        assert_eq!(ctx.method, "GET");
    }

    #[test]
    fn test_distinct_request_ids() {
        assert_ne!(
            RequestContext::internal().request_id,
            RequestContext::internal().request_id
        );
    }
}
