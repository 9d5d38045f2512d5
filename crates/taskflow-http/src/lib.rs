//! HTTP persistence for Taskflow
//!
//! Implements `GraphPersistence` on top of the taskflow REST API using
//! `reqwest`. Bodies are camelCase JSON wrapped in a `{"data", "error"}`
//! envelope.

mod client;

pub use client::{HttpGraphPersistence, HttpPersistenceConfig};
