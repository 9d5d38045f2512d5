use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use taskflow_core::{
    CoreError, Edge, EdgeId, GraphId, GraphPersistence, Node, NodeId, NodeSyncState, NodeUpdate,
    TaskId, TaskPatch, TaskPayload,
};

/// Persistence method, used to target fault injection and filter the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceMethod {
    FetchNodes,
    FetchEdges,
    CreateNode,
    UpdateNode,
    DeleteNode,
    CreateEdge,
    CreateEdgesBulk,
    DeleteEdges,
    UpdateTask,
}

impl PersistenceMethod {
    /// Method name as it appears in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceMethod::FetchNodes => "fetch_nodes",
            PersistenceMethod::FetchEdges => "fetch_edges",
            PersistenceMethod::CreateNode => "create_node",
            PersistenceMethod::UpdateNode => "update_node",
            PersistenceMethod::DeleteNode => "delete_node",
            PersistenceMethod::CreateEdge => "create_edge",
            PersistenceMethod::CreateEdgesBulk => "create_edges_bulk",
            PersistenceMethod::DeleteEdges => "delete_edges",
            PersistenceMethod::UpdateTask => "update_task",
        }
    }
}

impl fmt::Display for PersistenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded call with the ids it carried
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceCall {
    FetchNodes,
    FetchEdges,
    CreateNode(NodeId),
    UpdateNode(NodeId, NodeUpdate),
    DeleteNode(NodeId),
    CreateEdge(EdgeId),
    CreateEdgesBulk(Vec<EdgeId>),
    DeleteEdges(Vec<EdgeId>),
    UpdateTask(TaskId, TaskPatch),
}

impl PersistenceCall {
    /// Method this call went to
    pub fn method(&self) -> PersistenceMethod {
        match self {
            PersistenceCall::FetchNodes => PersistenceMethod::FetchNodes,
            PersistenceCall::FetchEdges => PersistenceMethod::FetchEdges,
            PersistenceCall::CreateNode(_) => PersistenceMethod::CreateNode,
            PersistenceCall::UpdateNode(..) => PersistenceMethod::UpdateNode,
            PersistenceCall::DeleteNode(_) => PersistenceMethod::DeleteNode,
            PersistenceCall::CreateEdge(_) => PersistenceMethod::CreateEdge,
            PersistenceCall::CreateEdgesBulk(_) => PersistenceMethod::CreateEdgesBulk,
            PersistenceCall::DeleteEdges(_) => PersistenceMethod::DeleteEdges,
            PersistenceCall::UpdateTask(..) => PersistenceMethod::UpdateTask,
        }
    }
}

/// Journal entry
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub graph_id: GraphId,
    pub call: PersistenceCall,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
struct GraphRecord {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

// Remaining failures per method; `None` fails forever
type FaultPlan = HashMap<PersistenceMethod, Option<usize>>;

/// In-memory implementation of GraphPersistence
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphPersistence {
    graphs: Arc<RwLock<HashMap<String, GraphRecord>>>,
    journal: Arc<RwLock<Vec<RecordedCall>>>,
    faults: Arc<RwLock<FaultPlan>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryGraphPersistence {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of a graph
    pub async fn seed(&self, graph_id: &GraphId, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut graphs = self.graphs.write().await;
        graphs.insert(graph_id.0.clone(), GraphRecord { nodes, edges });
    }

    /// Snapshot of the stored nodes of a graph
    pub async fn nodes(&self, graph_id: &GraphId) -> Vec<Node> {
        let graphs = self.graphs.read().await;
        graphs
            .get(&graph_id.0)
            .map(|graph| graph.nodes.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the stored edges of a graph
    pub async fn edges(&self, graph_id: &GraphId) -> Vec<Edge> {
        let graphs = self.graphs.read().await;
        graphs
            .get(&graph_id.0)
            .map(|graph| graph.edges.clone())
            .unwrap_or_default()
    }

    /// Every call received so far, including failed ones
    pub async fn calls(&self) -> Vec<PersistenceCall> {
        self.journal
            .read()
            .await
            .iter()
            .map(|entry| entry.call.clone())
            .collect()
    }

    /// Calls received for one method
    pub async fn calls_to(&self, method: PersistenceMethod) -> Vec<PersistenceCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.method() == method)
            .collect()
    }

    /// Full journal with graph ids and timestamps
    pub async fn journal(&self) -> Vec<RecordedCall> {
        self.journal.read().await.clone()
    }

    /// Fail the next `times` calls to `method`
    pub async fn fail_next(&self, method: PersistenceMethod, times: usize) {
        self.faults.write().await.insert(method, Some(times));
    }

    /// Fail every call to `method` until faults are cleared
    pub async fn fail_always(&self, method: PersistenceMethod) {
        self.faults.write().await.insert(method, None);
    }

    /// Remove every injected fault
    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Delay applied to every call
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    async fn enter(&self, graph_id: &GraphId, call: PersistenceCall) -> Result<(), CoreError> {
        let method = call.method();
        self.journal.write().await.push(RecordedCall {
            graph_id: graph_id.clone(),
            call,
            at: Utc::now(),
        });

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.write().await;
        let inject = match faults.get_mut(&method) {
            Some(None) => true,
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        if inject {
            warn!(graph_id = %graph_id, method = %method, "Injected persistence failure");
            return Err(CoreError::PersistenceError(format!(
                "Injected failure for {}",
                method
            )));
        }

        debug!(graph_id = %graph_id, method = %method, "In-memory persistence call");
        Ok(())
    }
}

#[async_trait]
impl GraphPersistence for InMemoryGraphPersistence {
    async fn fetch_nodes(&self, graph_id: &GraphId) -> Result<Vec<Node>, CoreError> {
        self.enter(graph_id, PersistenceCall::FetchNodes).await?;
        Ok(self.nodes(graph_id).await)
    }

    async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<Edge>, CoreError> {
        self.enter(graph_id, PersistenceCall::FetchEdges).await?;
        Ok(self.edges(graph_id).await)
    }

    async fn create_node(&self, graph_id: &GraphId, node: &Node) -> Result<Node, CoreError> {
        self.enter(graph_id, PersistenceCall::CreateNode(node.id.clone()))
            .await?;

        let mut graphs = self.graphs.write().await;
        let graph = graphs.entry(graph_id.0.clone()).or_default();
        if graph.nodes.iter().any(|existing| existing.id == node.id) {
            return Err(CoreError::DuplicateNode(node.id.to_string()));
        }

        let mut stored = node.clone();
        stored.sync_state = NodeSyncState::Persisted;
        stored.selected = false;
        stored.dragging = false;
        graph.nodes.push(stored.clone());
        Ok(stored)
    }

    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        update: &NodeUpdate,
    ) -> Result<Node, CoreError> {
        self.enter(
            graph_id,
            PersistenceCall::UpdateNode(node_id.clone(), update.clone()),
        )
        .await?;

        let mut graphs = self.graphs.write().await;
        let node = graphs
            .get_mut(&graph_id.0)
            .and_then(|graph| graph.nodes.iter_mut().find(|node| &node.id == node_id))
            .ok_or_else(|| CoreError::NotFound(format!("Node {}", node_id)))?;

        if let Some(position) = update.position {
            node.position = position;
        }
        if let Some(node_type) = &update.node_type {
            node.node_type = node_type.clone();
        }
        Ok(node.clone())
    }

    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<(), CoreError> {
        self.enter(graph_id, PersistenceCall::DeleteNode(node_id.clone()))
            .await?;

        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(&graph_id.0)
            .ok_or_else(|| CoreError::NotFound(format!("Node {}", node_id)))?;
        let before = graph.nodes.len();
        graph.nodes.retain(|node| &node.id != node_id);
        if graph.nodes.len() == before {
            return Err(CoreError::NotFound(format!("Node {}", node_id)));
        }
        Ok(())
    }

    async fn create_edge(&self, graph_id: &GraphId, edge: &Edge) -> Result<Edge, CoreError> {
        self.enter(graph_id, PersistenceCall::CreateEdge(edge.id.clone()))
            .await?;

        let mut graphs = self.graphs.write().await;
        let graph = graphs.entry(graph_id.0.clone()).or_default();
        if graph.edges.iter().any(|existing| existing.id == edge.id) {
            return Err(CoreError::ValidationError(format!(
                "Edge {} already exists",
                edge.id
            )));
        }
        graph.edges.push(edge.clone());
        Ok(edge.clone())
    }

    async fn create_edges_bulk(
        &self,
        graph_id: &GraphId,
        edges: &[Edge],
    ) -> Result<Vec<Edge>, CoreError> {
        self.enter(
            graph_id,
            PersistenceCall::CreateEdgesBulk(edges.iter().map(|edge| edge.id.clone()).collect()),
        )
        .await?;

        let mut graphs = self.graphs.write().await;
        let graph = graphs.entry(graph_id.0.clone()).or_default();
        if let Some(existing) = edges
            .iter()
            .find(|edge| graph.edges.iter().any(|stored| stored.id == edge.id))
        {
            return Err(CoreError::ValidationError(format!(
                "Edge {} already exists",
                existing.id
            )));
        }
        graph.edges.extend(edges.iter().cloned());
        Ok(edges.to_vec())
    }

    async fn delete_edges(&self, graph_id: &GraphId, edge_ids: &[EdgeId]) -> Result<(), CoreError> {
        self.enter(graph_id, PersistenceCall::DeleteEdges(edge_ids.to_vec()))
            .await?;

        let mut graphs = self.graphs.write().await;
        if let Some(graph) = graphs.get_mut(&graph_id.0) {
            graph.edges.retain(|edge| !edge_ids.contains(&edge.id));
        }
        Ok(())
    }

    async fn update_task(
        &self,
        graph_id: &GraphId,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<TaskPayload, CoreError> {
        self.enter(
            graph_id,
            PersistenceCall::UpdateTask(task_id.clone(), patch.clone()),
        )
        .await?;

        let mut graphs = self.graphs.write().await;
        let node = graphs
            .get_mut(&graph_id.0)
            .and_then(|graph| graph.nodes.iter_mut().find(|node| &node.task_id() == task_id))
            .ok_or_else(|| CoreError::NotFound(format!("Task {}", task_id)))?;

        node.data.apply(patch);
        Ok(node.data.clone())
    }
}
