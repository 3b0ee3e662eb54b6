//! Row materialization
//!
//! Rows arrive from the remote channel as JSON objects. Full rows become
//! typed `Entity` values checked against the type registry; projected rows
//! pass through untouched as partial records.

mod materializer;

pub use materializer::Materializer;
