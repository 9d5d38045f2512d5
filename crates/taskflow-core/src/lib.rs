//!
//! Taskflow Core - graph model, layout and background sync for taskflow canvases
//!
//! This crate holds the in-memory graph store for one taskflow, the tree
//! position calculator, and the background replicator that mirrors local
//! mutations to a [`GraphPersistence`] backend without blocking the caller.

#![forbid(unsafe_code)]

/// Domain layer - graph model, changes, layout and persistence boundary
pub mod domain;

/// Application services - background sync and graph store
pub mod application;

/// Configuration
pub mod config;

/// Error types
pub mod error;

pub use error::CoreError;

pub use application::background_sync::{
    BackgroundSync, FailedOperation, FailurePolicy, RetryPolicy, SyncConfig, SyncMode, SyncTicket,
};
pub use application::graph_store::{
    ConnectOutcome, ConnectedNode, GraphStore, LayoutOutcome, NodeRemoval,
};
pub use config::{PersistenceBackend, PersistenceConfig, TaskflowConfig};
pub use domain::changes::{ChangeSummary, EdgeChange, NodeChange};
pub use domain::events::{SyncEvent, SyncOperation, SyncOperationKind, SyncOutcome};
pub use domain::graph::{
    Connection, Edge, EdgeId, EdgeKind, EdgeStyle, GraphId, Node, NodeId, NodeSyncState,
    NodeType, NodeUpdate, Position, TaskId, TaskPatch, TaskPayload, TaskPriority,
};
pub use domain::layout::{LayoutConfig, LayoutError, NodePosition, PositionCalculator};
pub use domain::repository::GraphPersistence;
