//! Tree layout for taskflow canvases.
//!
//! The calculator treats the graph as a tree rooted at a given node: outgoing
//! edges are followed in edge order, already visited targets are skipped, and
//! every child is placed one horizontal gap to the right of its parent. Once a
//! child's subtree has been laid out, the child itself is moved down by
//! `vertical_gap * sibling_index` relative to its parent. Descendants keep the
//! coordinates they got during the recursive call.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use super::graph::{Edge, EdgeId, NodeId, Position};

/// Gap constants and limits for the tree layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Distance between a parent and its children on the x axis
    #[serde(default = "default_horizontal_gap")]
    pub horizontal_gap: f64,

    /// Distance between consecutive siblings on the y axis
    #[serde(default = "default_vertical_gap")]
    pub vertical_gap: f64,

    /// Deepest traversal allowed before the layout gives up
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_horizontal_gap() -> f64 {
    400.0
}

fn default_vertical_gap() -> f64 {
    200.0
}

fn default_max_depth() -> usize {
    4096
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_gap: default_horizontal_gap(),
            vertical_gap: default_vertical_gap(),
            max_depth: default_max_depth(),
        }
    }
}

impl LayoutConfig {
    /// Config with explicit gaps and the default depth limit
    pub fn with_gaps(horizontal_gap: f64, vertical_gap: f64) -> Self {
        Self {
            horizontal_gap,
            vertical_gap,
            ..Self::default()
        }
    }
}

/// Computed position for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

impl NodePosition {
    fn new(id: NodeId, position: Position) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
        }
    }

    /// Coordinates as a position
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Reasons a traversal is abandoned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// An edge has an empty endpoint id
    #[error("Malformed edge {0}: empty endpoint")]
    MalformedEdge(EdgeId),

    /// The traversal went deeper than the configured limit
    #[error("Layout depth limit of {0} exceeded")]
    DepthLimitExceeded(usize),

    /// A coordinate became NaN or infinite
    #[error("Non-finite coordinate computed for node {0}")]
    NonFiniteCoordinate(NodeId),
}

/// Pure tree layout over a borrowed edge list
#[derive(Debug, Clone, Default)]
pub struct PositionCalculator {
    config: LayoutConfig,
}

type Adjacency<'a> = HashMap<&'a str, Vec<&'a Edge>>;

impl PositionCalculator {
    /// Create a calculator with the given gaps
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out `root` and everything reachable from it.
    ///
    /// Never fails: if the traversal errors, the result is the root alone at
    /// `origin`.
    pub fn calculate(&self, root: &NodeId, origin: Position, edges: &[Edge]) -> Vec<NodePosition> {
        match self.try_calculate(root, origin, edges) {
            Ok(positions) => positions,
            Err(e) => {
                warn!(root = %root, error = %e, "Layout failed, keeping root position");
                vec![NodePosition::new(root.clone(), origin)]
            }
        }
    }

    /// Lay out `root` and everything reachable from it, reporting failures.
    ///
    /// The result is in pre-order and contains each visited node once. Only
    /// edges reached by the traversal are checked for empty endpoints.
    pub fn try_calculate<'a>(
        &self,
        root: &'a NodeId,
        origin: Position,
        edges: &'a [Edge],
    ) -> Result<Vec<NodePosition>, LayoutError> {
        let mut children: Adjacency<'a> = HashMap::new();
        for edge in edges {
            children.entry(edge.source.as_str()).or_default().push(edge);
        }

        let mut visited = HashSet::new();
        let mut positions = Vec::new();
        self.layout_subtree(root, origin, 0, &children, &mut visited, &mut positions)?;

        debug!(root = %root, count = positions.len(), "Computed layout");
        Ok(positions)
    }

    fn layout_subtree<'a>(
        &self,
        node: &'a NodeId,
        position: Position,
        depth: usize,
        children: &Adjacency<'a>,
        visited: &mut HashSet<&'a str>,
        positions: &mut Vec<NodePosition>,
    ) -> Result<(), LayoutError> {
        if depth > self.config.max_depth {
            return Err(LayoutError::DepthLimitExceeded(self.config.max_depth));
        }
        if !position.is_finite() {
            return Err(LayoutError::NonFiniteCoordinate(node.clone()));
        }

        visited.insert(node.as_str());
        positions.push(NodePosition::new(node.clone(), position));

        let Some(outgoing) = children.get(node.as_str()) else {
            return Ok(());
        };

        let mut sibling_index = 0usize;
        for &edge in outgoing {
            if edge.source.as_str().is_empty() || edge.target.as_str().is_empty() {
                return Err(LayoutError::MalformedEdge(edge.id.clone()));
            }
            let target = &edge.target;
            if visited.contains(target.as_str()) {
                continue;
            }

            let tentative = position.offset(self.config.horizontal_gap, 0.0);
            let subtree_root = positions.len();
            self.layout_subtree(target, tentative, depth + 1, children, visited, positions)?;

            // Override the subtree root only after its descendants are placed.
            let y = position.y + self.config.vertical_gap * sibling_index as f64;
            if !y.is_finite() {
                return Err(LayoutError::NonFiniteCoordinate(target.clone()));
            }
            positions[subtree_root].y = y;
            sibling_index += 1;
        }

        Ok(())
    }
}
