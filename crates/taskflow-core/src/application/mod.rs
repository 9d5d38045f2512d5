//! Application services: background replication and the graph store

/// Non-blocking replication of local mutations
pub mod background_sync;

/// In-memory graph state and its mutation operations
pub mod graph_store;
