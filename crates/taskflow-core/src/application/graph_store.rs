//! Graph store: in-memory source of truth for one taskflow canvas.
//!
//! Every mutation is applied to local state first and then handed to
//! [`BackgroundSync`] for replication. Nothing here awaits persistence.

use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::background_sync::{BackgroundSync, SyncTicket};
use crate::domain::changes::{ChangeSummary, EdgeChange, NodeChange};
use crate::domain::events::{SyncEvent, SyncOperation};
use crate::domain::graph::{
    Connection, Edge, EdgeId, EdgeKind, GraphId, Node, NodeId, NodeSyncState, NodeType,
    NodeUpdate, Position, TaskPatch, TaskPayload,
};
use crate::domain::layout::PositionCalculator;
use crate::CoreError;

/// Result of [`GraphStore::on_connect`]
#[derive(Debug)]
pub enum ConnectOutcome {
    /// A new edge was added and submitted for persistence
    Added { edge_id: EdgeId, ticket: SyncTicket },
    /// An edge with the same source and target already exists
    Duplicate,
}

impl ConnectOutcome {
    /// Id of the added edge
    pub fn edge_id(&self) -> Option<&EdgeId> {
        match self {
            ConnectOutcome::Added { edge_id, .. } => Some(edge_id),
            ConnectOutcome::Duplicate => None,
        }
    }

    /// The connection was a no-op
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ConnectOutcome::Duplicate)
    }
}

/// Result of [`GraphStore::recalculate_node_positions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// Layout ran; `moved` nodes changed position
    Applied { moved: usize },
    /// Every node has an incoming edge
    NoRoot,
    /// No nodes
    Empty,
}

/// Result of [`GraphStore::create_connected_node`]
#[derive(Debug)]
pub struct ConnectedNode {
    pub node_id: NodeId,
    pub edge_id: EdgeId,
    pub position: Position,
    pub ticket: SyncTicket,
}

/// Result of [`GraphStore::delete_node`]
#[derive(Debug)]
pub struct NodeRemoval {
    /// Edges removed with the node
    pub removed_edges: Vec<EdgeId>,
    /// Background operations submitted: the node delete if the node is replicated,
    /// then the bulk edge delete if any
    pub tickets: Vec<SyncTicket>,
}

/// Nodes and edges of one taskflow
#[derive(Debug)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    calculator: PositionCalculator,
    sync: BackgroundSync,
    creations: mpsc::UnboundedReceiver<SyncEvent>,
    creation_reports: mpsc::UnboundedSender<SyncEvent>,
}

impl GraphStore {
    /// Empty store replicating through `sync`
    pub fn new(sync: BackgroundSync, calculator: PositionCalculator) -> Self {
        let (creation_reports, creations) = mpsc::unbounded_channel();
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            calculator,
            sync,
            creations,
            creation_reports,
        }
    }

    /// Store populated from the persistence layer
    pub async fn load(sync: BackgroundSync, calculator: PositionCalculator) -> Result<Self, CoreError> {
        let persistence = sync.persistence();
        let graph_id = sync.graph_id().clone();

        let mut nodes = persistence.fetch_nodes(&graph_id).await?;
        let edges = persistence.fetch_edges(&graph_id).await?;
        for node in &mut nodes {
            node.sync_state = NodeSyncState::Persisted;
        }

        debug!(graph_id = %graph_id, nodes = nodes.len(), edges = edges.len(), "Loaded taskflow graph");

        let mut store = Self::new(sync, calculator);
        store.nodes = nodes;
        store.edges = edges;
        Ok(store)
    }

    /// Graph this store holds
    pub fn graph_id(&self) -> &GraphId {
        self.sync.graph_id()
    }

    /// Current nodes
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Current edges
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node by id
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Sync handle, for subscriptions and idle waits
    pub fn sync(&self) -> &BackgroundSync {
        &self.sync
    }

    /// Layout calculator in use
    pub fn calculator(&self) -> &PositionCalculator {
        &self.calculator
    }

    /// Replace all nodes
    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        debug!(count = nodes.len(), "Replacing nodes");
        self.nodes = nodes;
    }

    /// Replace all edges
    pub fn set_edges(&mut self, edges: Vec<Edge>) {
        debug!(count = edges.len(), "Replacing edges");
        self.edges = edges;
    }

    /// Append a node without persisting it
    pub fn add_node(
        &mut self,
        id: NodeId,
        data: TaskPayload,
        node_type: NodeType,
        position: Option<Position>,
    ) -> Result<(), CoreError> {
        if self.node(&id).is_some() {
            return Err(CoreError::DuplicateNode(id.to_string()));
        }
        let position = position.unwrap_or_default();
        if !position.is_finite() {
            return Err(CoreError::ValidationError(format!(
                "Position of node {} is not finite",
                id
            )));
        }

        debug!(node_id = %id, x = position.x, y = position.y, "Adding node");
        self.nodes.push(Node::new(id, node_type, position, data));
        Ok(())
    }

    /// Append a node and persist it in the background
    pub fn create_node(
        &mut self,
        id: NodeId,
        data: TaskPayload,
        node_type: NodeType,
        position: Option<Position>,
    ) -> Result<SyncTicket, CoreError> {
        self.add_node(id.clone(), data, node_type, position)?;

        let node = self.mark_pending(&id)?;
        Ok(self
            .sync
            .submit_observed(SyncOperation::CreateNode(node), self.creation_reports.clone()))
    }

    /// Create a node as a child of `parent`, placed by the layout calculator
    pub fn create_connected_node(
        &mut self,
        parent: &NodeId,
        data: TaskPayload,
        node_type: NodeType,
        kind: EdgeKind,
    ) -> Result<ConnectedNode, CoreError> {
        let parent_position = self
            .node(parent)
            .map(|node| node.position)
            .ok_or_else(|| CoreError::NodeNotFound(parent.to_string()))?;

        let node_id = NodeId::generate();
        let edge = Edge::new(parent.clone(), node_id.clone(), kind);
        let position = self.child_position(parent, parent_position, &edge);

        self.add_node(node_id.clone(), data, node_type, Some(position))?;
        self.edges.push(edge.clone());
        let node = self.mark_pending(&node_id)?;

        debug!(
            parent = %parent,
            node_id = %node_id,
            x = position.x,
            y = position.y,
            "Created connected node"
        );

        let edge_id = edge.id.clone();
        let ticket = self.sync.submit_observed(
            SyncOperation::CreateNodeWithEdges {
                node,
                edges: vec![edge],
            },
            self.creation_reports.clone(),
        );

        Ok(ConnectedNode {
            node_id,
            edge_id,
            position,
            ticket,
        })
    }

    fn child_position(&self, parent: &NodeId, origin: Position, new_edge: &Edge) -> Position {
        let mut edges = self.edges.clone();
        edges.push(new_edge.clone());

        let placed = self
            .calculator
            .calculate(parent, origin, &edges)
            .into_iter()
            .find(|p| p.id == new_edge.target)
            .map(|p| p.position());

        placed.unwrap_or_else(|| {
            let config = self.calculator.config();
            let siblings = self.edges.iter().filter(|e| &e.source == parent).count();
            origin.offset(config.horizontal_gap, config.vertical_gap * siblings as f64)
        })
    }

    fn mark_pending(&mut self, id: &NodeId) -> Result<Node, CoreError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|node| &node.id == id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;
        node.sync_state = NodeSyncState::Pending;
        Ok(node.clone())
    }

    /// Merge `patch` into the node's task payload.
    ///
    /// Returns `None` when nothing was submitted: the patch is empty or the
    /// node does not exist remotely.
    pub fn update_node(&mut self, id: &NodeId, patch: TaskPatch) -> Result<Option<SyncTicket>, CoreError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|node| &node.id == id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;

        if patch.is_empty() {
            debug!(node_id = %id, "Empty task patch, nothing to update");
            return Ok(None);
        }

        node.data.apply(&patch);
        let task_id = node.task_id();
        debug!(node_id = %id, "Updated node task");

        if !node.sync_state.is_replicated() {
            debug!(node_id = %id, state = ?node.sync_state, "Node not replicated, task update kept local");
            return Ok(None);
        }

        Ok(Some(self.sync.submit(SyncOperation::UpdateTask { task_id, patch })))
    }

    /// Remove a node and every edge touching it
    pub fn delete_node(&mut self, id: &NodeId) -> Result<NodeRemoval, CoreError> {
        let (state, removed_edges) = self
            .remove_node_local(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;

        let mut tickets = Vec::new();
        if state.is_replicated() {
            tickets.push(self.sync.submit(SyncOperation::DeleteNode { id: id.clone() }));
        }
        if !removed_edges.is_empty() {
            tickets.push(self.sync.submit(SyncOperation::DeleteEdges(removed_edges.clone())));
        }

        Ok(NodeRemoval {
            removed_edges,
            tickets,
        })
    }

    fn remove_node_local(&mut self, id: &NodeId) -> Option<(NodeSyncState, Vec<EdgeId>)> {
        let index = self.nodes.iter().position(|node| &node.id == id)?;
        let state = self.nodes.remove(index).sync_state;

        let mut removed = Vec::new();
        self.edges.retain(|edge| {
            if edge.touches(id) {
                removed.push(edge.id.clone());
                false
            } else {
                true
            }
        });

        debug!(node_id = %id, removed_edges = removed.len(), "Removed node");
        Some((state, removed))
    }

    /// Apply node changes in order
    pub fn on_nodes_change(&mut self, changes: Vec<NodeChange>) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        let mut removed_edges = Vec::new();

        for change in changes {
            let target = change.node_id().clone();
            let applied = match change {
                NodeChange::Add(node) => {
                    if self.node(&node.id).is_some() || !node.position.is_finite() {
                        false
                    } else {
                        self.nodes.push(node);
                        true
                    }
                }
                NodeChange::Remove { id } => match self.remove_node_local(&id) {
                    Some((state, edges)) => {
                        removed_edges.extend(edges);
                        if state.is_replicated() {
                            self.sync.submit(SyncOperation::DeleteNode { id });
                        }
                        true
                    }
                    None => false,
                },
                NodeChange::Position {
                    id,
                    position,
                    dragging,
                } => match self.nodes.iter_mut().find(|node| node.id == id) {
                    Some(_) if position.is_some_and(|p| !p.is_finite()) => false,
                    Some(node) => {
                        if let Some(position) = position {
                            node.position = position;
                        }
                        node.dragging = dragging;
                        if !dragging && node.sync_state.is_replicated() {
                            let update = NodeUpdate::position(node.position);
                            self.sync.submit(SyncOperation::UpdateNode { id, update });
                        }
                        true
                    }
                    None => false,
                },
                NodeChange::Select { id, selected } => {
                    match self.nodes.iter_mut().find(|node| node.id == id) {
                        Some(node) => {
                            node.selected = selected;
                            true
                        }
                        None => false,
                    }
                }
            };

            if applied {
                summary.applied += 1;
            } else {
                warn!(node_id = %target, "Skipped node change: unknown or duplicate node, or non-finite position");
                summary.skipped += 1;
            }
        }

        if !removed_edges.is_empty() {
            self.sync.submit(SyncOperation::DeleteEdges(removed_edges));
        }
        debug!(applied = summary.applied, "Applied node changes");

        summary
    }

    /// Apply edge changes in order
    pub fn on_edges_change(&mut self, changes: Vec<EdgeChange>) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        let mut removed = Vec::new();

        for change in changes {
            let applied = match change {
                EdgeChange::Add(edge) => {
                    let exists = self
                        .edges
                        .iter()
                        .any(|e| e.id == edge.id || e.connects(&edge.source, &edge.target));
                    if !exists {
                        self.edges.push(edge);
                    }
                    !exists
                }
                EdgeChange::Remove { id } => match self.edges.iter().position(|e| e.id == id) {
                    Some(index) => {
                        self.edges.remove(index);
                        removed.push(id);
                        true
                    }
                    None => false,
                },
                EdgeChange::Select { id, selected } => {
                    match self.edges.iter_mut().find(|e| e.id == id) {
                        Some(edge) => {
                            edge.selected = selected;
                            true
                        }
                        None => false,
                    }
                }
            };

            if applied {
                summary.applied += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if !removed.is_empty() {
            self.sync.submit(SyncOperation::DeleteEdges(removed));
        }
        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "Skipped edge changes for unknown or duplicate edges");
        }
        debug!(applied = summary.applied, "Applied edge changes");

        summary
    }

    /// Remove edges by id and persist with one bulk delete
    pub fn delete_edges(&mut self, ids: &[EdgeId]) -> Option<SyncTicket> {
        if ids.is_empty() {
            return None;
        }

        let doomed: HashSet<&EdgeId> = ids.iter().collect();
        let before = self.edges.len();
        self.edges.retain(|edge| !doomed.contains(&edge.id));
        debug!(requested = ids.len(), removed = before - self.edges.len(), "Deleted edges");

        Some(self.sync.submit(SyncOperation::DeleteEdges(ids.to_vec())))
    }

    /// Add and persist an edge unless the pair is already connected
    pub fn on_connect(&mut self, connection: Connection) -> ConnectOutcome {
        if self
            .edges
            .iter()
            .any(|edge| edge.connects(&connection.source, &connection.target))
        {
            debug!(
                source = %connection.source,
                target = %connection.target,
                "Connection already exists"
            );
            return ConnectOutcome::Duplicate;
        }

        let edge = connection.into_edge();
        let edge_id = edge.id.clone();
        debug!(edge_id = %edge_id, source = %edge.source, target = %edge.target, "Connected nodes");
        self.edges.push(edge.clone());

        let ticket = self.sync.submit(SyncOperation::CreateEdge(edge));
        ConnectOutcome::Added { edge_id, ticket }
    }

    /// Re-run the tree layout from the first node without incoming edges
    pub fn recalculate_node_positions(&mut self) -> LayoutOutcome {
        if self.nodes.is_empty() {
            return LayoutOutcome::Empty;
        }

        let targets: HashSet<&NodeId> = self.edges.iter().map(|edge| &edge.target).collect();
        let Some(root) = self.nodes.iter().find(|node| !targets.contains(&node.id)) else {
            warn!(graph_id = %self.graph_id(), "No root node without incoming edges, layout skipped");
            return LayoutOutcome::NoRoot;
        };

        let root_id = root.id.clone();
        let positions = self.calculator.calculate(&root_id, root.position, &self.edges);

        let index: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();

        let mut moved = 0;
        for computed in positions {
            let Some(&i) = index.get(&computed.id) else {
                continue;
            };
            let position = computed.position();
            let node = &mut self.nodes[i];
            if node.position == position {
                continue;
            }

            node.position = position;
            moved += 1;
            if !node.sync_state.is_replicated() {
                continue;
            }
            self.sync.submit(SyncOperation::UpdateNode {
                id: computed.id,
                update: NodeUpdate::position(position),
            });
        }

        debug!(root = %root_id, moved, "Recalculated node positions");
        LayoutOutcome::Applied { moved }
    }

    /// Fold finished node creations into node sync states. Returns the number of nodes updated.
    pub fn reconcile(&mut self) -> usize {
        let mut updated = 0;

        loop {
            match self.creations.try_recv() {
                Ok(event) => {
                    let Some(node_id) = &event.node_id else {
                        continue;
                    };
                    let Some(node) = self.nodes.iter_mut().find(|node| &node.id == node_id) else {
                        continue;
                    };
                    if node.sync_state == NodeSyncState::Local {
                        continue;
                    }

                    let state = if event.node_created {
                        NodeSyncState::Persisted
                    } else {
                        warn!(node_id = %node_id, "Node creation failed, keeping local copy");
                        NodeSyncState::Failed
                    };
                    if node.sync_state != state {
                        node.sync_state = state;
                        updated += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        updated
    }

    /// Subscribe to sync outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }
}
