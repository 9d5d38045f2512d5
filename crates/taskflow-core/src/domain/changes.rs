//! Patch-list changes emitted by the canvas and applied in order by the graph store.

use super::graph::{Edge, EdgeId, Node, NodeId, Position};

/// One structural change to the node list
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    /// Append a node (local only)
    Add(Node),
    /// Remove a node and every edge touching it
    Remove { id: NodeId },
    /// Move a node. While `dragging` is true the move stays local.
    Position {
        id: NodeId,
        position: Option<Position>,
        dragging: bool,
    },
    /// Toggle selection
    Select { id: NodeId, selected: bool },
}

impl NodeChange {
    /// Id of the node the change targets
    pub fn node_id(&self) -> &NodeId {
        match self {
            NodeChange::Add(node) => &node.id,
            NodeChange::Remove { id }
            | NodeChange::Position { id, .. }
            | NodeChange::Select { id, .. } => id,
        }
    }
}

/// One structural change to the edge list
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    /// Append an edge (local only, duplicates ignored)
    Add(Edge),
    /// Remove an edge
    Remove { id: EdgeId },
    /// Toggle selection
    Select { id: EdgeId, selected: bool },
}

/// Counters returned after applying a change batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    /// Changes that modified local state
    pub applied: usize,
    /// Changes skipped because their target was unknown or duplicated
    pub skipped: usize,
}
