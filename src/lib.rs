//! entiq - lazy entity cursors with remote query pushdown
//!
//! A cursor is an immutable chain of operators over one entity type. When a
//! terminal operation runs, the longest prefix the remote engine can
//! evaluate is sent as one query; the rest runs locally over the streamed
//! rows, which are materialized against registered entity descriptors.

pub mod cli;
pub mod config;
pub mod materialize;
pub mod observability;
pub mod query;
pub mod remote;
pub mod types;
pub mod value;
