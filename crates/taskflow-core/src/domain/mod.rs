/// Nodes, edges, ids and task payloads
pub mod graph;

/// Patch-list changes emitted by the canvas
pub mod changes;

/// Tree layout over the edge set
pub mod layout;

/// Background sync operations and their outcome events
pub mod events;

/// Persistence boundary
pub mod repository;
