//! Observability for cursor evaluation
//!
//! - Structured logging (one JSON object per line)
//! - Lifecycle scopes around cursor iterations
//! - Counters per entity store
//!
//! ```ignore
//! use entiq::observability::{Logger, ObservationScope};
//!
//! Logger::info("REMOTE_OPEN", &[("entity", "Foo")]);
//!
//! let scope = ObservationScope::new("CURSOR_ITERATION");
//! // ... pull rows ...
//! scope.complete();
//! ```

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, QueryMetrics};
pub use scope::ObservationScope;
