use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::graph::{Edge, EdgeId, Node, NodeId, NodeUpdate, TaskId, TaskPatch};

/// A local mutation to replicate to the persistence layer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    /// Create a node
    CreateNode(Node),
    /// Partially update a node (position, type)
    UpdateNode { id: NodeId, update: NodeUpdate },
    /// Delete a node
    DeleteNode { id: NodeId },
    /// Create one edge
    CreateEdge(Edge),
    /// Create several edges in one call
    CreateEdges(Vec<Edge>),
    /// Delete several edges in one call
    DeleteEdges(Vec<EdgeId>),
    /// Partially update the task behind a node
    UpdateTask { task_id: TaskId, patch: TaskPatch },
    /// Create a node, then its edges once the node exists remotely
    CreateNodeWithEdges { node: Node, edges: Vec<Edge> },
}

impl SyncOperation {
    /// Discriminant of the operation
    pub fn kind(&self) -> SyncOperationKind {
        match self {
            SyncOperation::CreateNode(_) => SyncOperationKind::CreateNode,
            SyncOperation::UpdateNode { .. } => SyncOperationKind::UpdateNode,
            SyncOperation::DeleteNode { .. } => SyncOperationKind::DeleteNode,
            SyncOperation::CreateEdge(_) => SyncOperationKind::CreateEdge,
            SyncOperation::CreateEdges(_) => SyncOperationKind::CreateEdges,
            SyncOperation::DeleteEdges(_) => SyncOperationKind::DeleteEdges,
            SyncOperation::UpdateTask { .. } => SyncOperationKind::UpdateTask,
            SyncOperation::CreateNodeWithEdges { .. } => SyncOperationKind::CreateNodeWithEdges,
        }
    }

    /// Node created by this operation, if any
    pub fn created_node(&self) -> Option<&NodeId> {
        match self {
            SyncOperation::CreateNode(node) | SyncOperation::CreateNodeWithEdges { node, .. } => {
                Some(&node.id)
            }
            _ => None,
        }
    }

    /// Short description of the ids involved, for logs
    pub fn subject(&self) -> String {
        fn join<T: fmt::Display>(ids: impl Iterator<Item = T>) -> String {
            ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
        }

        match self {
            SyncOperation::CreateNode(node) => node.id.to_string(),
            SyncOperation::UpdateNode { id, .. } | SyncOperation::DeleteNode { id } => id.to_string(),
            SyncOperation::CreateEdge(edge) => edge.id.to_string(),
            SyncOperation::CreateEdges(edges) => join(edges.iter().map(|e| &e.id)),
            SyncOperation::DeleteEdges(ids) => join(ids.iter()),
            SyncOperation::UpdateTask { task_id, .. } => task_id.to_string(),
            SyncOperation::CreateNodeWithEdges { node, edges } => {
                format!("{}+[{}]", node.id, join(edges.iter().map(|e| &e.id)))
            }
        }
    }
}

/// Operation discriminant, cheap to copy into events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationKind {
    CreateNode,
    UpdateNode,
    DeleteNode,
    CreateEdge,
    CreateEdges,
    DeleteEdges,
    UpdateTask,
    CreateNodeWithEdges,
}

impl SyncOperationKind {
    /// Stable name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperationKind::CreateNode => "create_node",
            SyncOperationKind::UpdateNode => "update_node",
            SyncOperationKind::DeleteNode => "delete_node",
            SyncOperationKind::CreateEdge => "create_edge",
            SyncOperationKind::CreateEdges => "create_edges",
            SyncOperationKind::DeleteEdges => "delete_edges",
            SyncOperationKind::UpdateTask => "update_task",
            SyncOperationKind::CreateNodeWithEdges => "create_node_with_edges",
        }
    }
}

impl fmt::Display for SyncOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a background operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Replicated
    Succeeded,
    /// Gave up; local state is left as is
    Failed { error: String },
}

/// Event: background operation finished
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    /// Submission sequence number
    pub sequence: u64,

    /// Operation discriminant
    pub operation: SyncOperationKind,

    /// Ids involved in the operation
    pub subject: String,

    /// Node created by the operation, if any
    pub node_id: Option<NodeId>,

    /// The node in `node_id` exists remotely, even if later steps failed
    pub node_created: bool,

    /// Number of attempts made
    pub attempts: u32,

    /// Outcome
    pub outcome: SyncOutcome,

    /// When the operation finished
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// Returns the type of the event as a string
    pub fn event_type(&self) -> &'static str {
        match self.outcome {
            SyncOutcome::Succeeded => "sync.succeeded",
            SyncOutcome::Failed { .. } => "sync.failed",
        }
    }

    /// The operation was replicated
    pub fn is_success(&self) -> bool {
        self.outcome == SyncOutcome::Succeeded
    }
}
