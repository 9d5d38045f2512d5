//! Graph model for a taskflow canvas: nodes, edges and the task payload they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: Graph (taskflow) ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub String);

/// Value object: Node ID, generated client-side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// Value object: Edge ID, generated client-side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub String);

/// Value object: Task ID. A node materializes exactly one task and shares its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(GraphId);
string_id!(NodeId);
string_id!(EdgeId);
string_id!(TaskId);

impl NodeId {
    /// Generate a fresh client-side id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl EdgeId {
    /// Generate a fresh client-side id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&NodeId> for TaskId {
    fn from(node_id: &NodeId) -> Self {
        TaskId(node_id.0.clone())
    }
}

/// Canvas position in canvas units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a position
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position shifted by the given deltas
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Renderer type tag for a node (e.g. `task`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(pub String);

impl NodeType {
    /// The default task node type
    pub fn task() -> Self {
        Self("task".to_string())
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::task()
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Domain fields of the task a node represents
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
}

impl TaskPayload {
    /// Payload with only a title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Shallow merge: fields set on the patch override, omitted fields are retained
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = &patch.status {
            self.status = Some(status.clone());
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = Some(start_date);
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(assignee_ids) = &patch.assignee_ids {
            self.assignee_ids = assignee_ids.clone();
        }
    }
}

/// Partial task update; serializes only the fields that are set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<String>>,
}

impl TaskPatch {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }

    /// Patch that only changes the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Partial node update sent to the persistence layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
}

impl NodeUpdate {
    /// Update carrying only a new position
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            node_type: None,
        }
    }
}

/// Local persistence lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSyncState {
    /// Added locally, never submitted for persistence
    #[default]
    Local,
    /// Creation submitted, outcome not yet known
    Pending,
    /// Known to exist remotely
    Persisted,
    /// Creation failed; the node is kept locally
    Failed,
}

impl NodeSyncState {
    /// Node-level updates and deletes are replicated for this node
    pub fn is_replicated(self) -> bool {
        matches!(self, NodeSyncState::Pending | NodeSyncState::Persisted)
    }
}

/// Node: one task placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    pub position: Position,
    pub data: TaskPayload,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub dragging: bool,
    #[serde(skip)]
    pub sync_state: NodeSyncState,
}

impl Node {
    /// Create a node in `Local` sync state
    pub fn new(id: NodeId, node_type: NodeType, position: Position, data: TaskPayload) -> Self {
        Self {
            id,
            node_type,
            position,
            data,
            selected: false,
            dragging: false,
            sync_state: NodeSyncState::Local,
        }
    }

    /// Same node in the given sync state
    pub fn with_sync_state(mut self, sync_state: NodeSyncState) -> Self {
        self.sync_state = sync_state;
        self
    }

    /// Id of the task this node represents
    pub fn task_id(&self) -> TaskId {
        TaskId::from(&self.id)
    }
}

/// Kind of relationship an edge expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Sequential next task
    #[default]
    Next,
    /// Optional next task
    OptionalNext,
    /// Target is blocked by the source
    Blocked,
}

impl EdgeKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Next => "next",
            EdgeKind::OptionalNext => "optional-next",
            EdgeKind::Blocked => "blocked",
        }
    }
}

/// Rendering metadata for an edge
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    #[serde(default)]
    pub animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Edge: directed, typed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyle>,
    #[serde(default)]
    pub selected: bool,
}

impl Edge {
    /// Create an edge with a generated id
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self::with_id(EdgeId::generate(), source, target, kind)
    }

    /// Create an edge with an explicit id
    pub fn with_id(id: EdgeId, source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self {
            id,
            source,
            target,
            kind,
            style: None,
            selected: false,
        }
    }

    /// The node is either endpoint
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }

    /// Same (source, target) pair
    pub fn connects(&self, source: &NodeId, target: &NodeId) -> bool {
        &self.source == source && &self.target == target
    }
}

/// A proposed connection between two existing nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub style: Option<EdgeStyle>,
}

impl Connection {
    /// Connection of the given kind without style metadata
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            style: None,
        }
    }

    /// Materialize as an edge with a generated id
    pub fn into_edge(self) -> Edge {
        let mut edge = Edge::new(self.source, self.target, self.kind);
        edge.style = self.style;
        edge
    }
}
