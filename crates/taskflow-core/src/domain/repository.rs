//! Persistence boundary for taskflow graphs
//!
//! This module defines the trait the graph store and background sync use to
//! read and replicate graph state. External crates implement it to provide
//! different transports (in-memory, HTTP).

use async_trait::async_trait;

use super::graph::{
    Edge, EdgeId, GraphId, Node, NodeId, NodeUpdate, TaskId, TaskPatch, TaskPayload,
};
use crate::CoreError;

/// Remote store for the nodes, edges and tasks of a taskflow
#[async_trait]
pub trait GraphPersistence: Send + Sync {
    /// Fetch every node of a graph
    async fn fetch_nodes(&self, graph_id: &GraphId) -> Result<Vec<Node>, CoreError>;

    /// Fetch every edge of a graph
    async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<Edge>, CoreError>;

    /// Create a node with its client-generated id
    async fn create_node(&self, graph_id: &GraphId, node: &Node) -> Result<Node, CoreError>;

    /// Apply a partial update to a node
    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        update: &NodeUpdate,
    ) -> Result<Node, CoreError>;

    /// Delete a node
    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<(), CoreError>;

    /// Create a single edge
    async fn create_edge(&self, graph_id: &GraphId, edge: &Edge) -> Result<Edge, CoreError>;

    /// Create several edges in one call
    async fn create_edges_bulk(
        &self,
        graph_id: &GraphId,
        edges: &[Edge],
    ) -> Result<Vec<Edge>, CoreError>;

    /// Delete several edges in one call
    async fn delete_edges(&self, graph_id: &GraphId, edge_ids: &[EdgeId]) -> Result<(), CoreError>;

    /// Apply a partial update to the task behind a node
    async fn update_task(
        &self,
        graph_id: &GraphId,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<TaskPayload, CoreError>;
}
