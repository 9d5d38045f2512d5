//! In-memory graph persistence for Taskflow
//!
//! This crate provides an in-memory implementation of the `GraphPersistence`
//! trait defined in taskflow-core. It records every call it receives and can
//! inject failures and latency, which makes it the backend of choice for
//! development and tests.

pub mod repositories;
pub use repositories::{
    InMemoryGraphPersistence, PersistenceCall, PersistenceMethod, RecordedCall,
};
