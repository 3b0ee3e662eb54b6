//! Query metrics
//!
//! - Counters only, monotonic
//! - One registry per `EntityStore`, shared by every cursor it creates
//! - Relaxed atomics; values are exact once iterations have finished

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for cursor iterations
#[derive(Debug, Default)]
pub struct QueryMetrics {
    iterations_completed: AtomicU64,
    iterations_failed: AtomicU64,
    remote_queries: AtomicU64,
    short_circuits: AtomicU64,
    local_stages: AtomicU64,
    rows_returned: AtomicU64,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one split: a remote query opened (or short-circuited) plus
    /// the number of local stages stacked on it
    pub fn record_split(&self, opened_remote: bool, local_stages: usize) {
        if opened_remote {
            self.remote_queries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.short_circuits.fetch_add(1, Ordering::Relaxed);
        }
        self.local_stages
            .fetch_add(local_stages as u64, Ordering::Relaxed);
    }

    pub fn record_completed(&self, rows: u64) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.iterations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            iterations_completed: self.iterations_completed.load(Ordering::Relaxed),
            iterations_failed: self.iterations_failed.load(Ordering::Relaxed),
            remote_queries: self.remote_queries.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            local_stages: self.local_stages.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    pub remote_queries: u64,
    pub short_circuits: u64,
    pub local_stages: u64,
    pub rows_returned: u64,
}
