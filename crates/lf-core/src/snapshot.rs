//! Snapshot wire format and the persistence port.
//!
//! A snapshot is the full engine state as plain ordered records: nodes in
//! insertion order with their neighbor maps flattened to `(id, strength)`
//! pairs, edges in insertion order, the field state, the stability history
//! and the training log. JSON uses camelCase keys.
//!
//! Restoring validates everything a store relies on. A snapshot that fails
//! any check is rejected whole; there is no partial restore.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{GRADIENT_CAPACITY, STABILITY_HISTORY_CAPACITY, TRAINING_LOG_CAPACITY};
use crate::engine::TrainingEntry;
use crate::field::FieldState;
use crate::graph::GraphStore;
use crate::node::{Edge, Node, NodeKind, NodeWeights, normalize};

pub const CURRENT_VERSION: &str = "1.0";

/// Error type crossing the `SnapshotPort` seam.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Durable storage for engine snapshots, injected by the caller.
pub trait SnapshotPort: Send {
    /// The last saved snapshot, or `None` if nothing was ever saved.
    fn load(&mut self) -> Result<Option<EngineSnapshot>, PortError>;
    /// Replace the stored snapshot.
    fn save(&mut self, snapshot: &EngineSnapshot) -> Result<(), PortError>;
    /// Remove the stored snapshot.
    fn erase(&mut self) -> Result<(), PortError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0:?}")]
    Version(String),
    #[error("duplicate node id {0}")]
    DuplicateNode(Uuid),
    #[error("duplicate node content {0:?}")]
    DuplicateContent(String),
    #[error("node {node} references unknown node {missing}")]
    DanglingReference { node: Uuid, missing: Uuid },
    #[error("inconsistent parent link {parent} -> {child}")]
    ParentLink { parent: Uuid, child: Uuid },
    #[error("duplicate edge {0} -> {1}")]
    DuplicateEdge(Uuid, Uuid),
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("{what} holds {len} entries, more than {limit}")]
    Capacity {
        what: &'static str,
        len: usize,
        limit: usize,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// --- Wire types ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub graph: GraphSnapshot,
    /// Oldest first.
    #[serde(default)]
    pub memories: Vec<TrainingEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub version: String,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<Edge>,
    pub field: FieldState,
    #[serde(default)]
    pub stability_history: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: Uuid,
    pub content: String,
    pub kind: NodeKind,
    pub weights: NodeWeights,
    pub curvature_signature: f64,
    pub field_value: f64,
    #[serde(default)]
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub children: Vec<Uuid>,
    #[serde(default)]
    pub neighbors: Vec<NeighborRecord>,
    pub created_at: u64,
    pub last_used_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub id: Uuid,
    pub strength: f64,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            content: node.content.clone(),
            kind: node.kind,
            weights: node.weights,
            curvature_signature: node.curvature_signature,
            field_value: node.field_value,
            parent: node.parent,
            children: node.children.clone(),
            neighbors: node
                .neighbors
                .iter()
                .map(|(&id, &strength)| NeighborRecord { id, strength })
                .collect(),
            created_at: node.created_at,
            last_used_at: node.last_used_at,
        }
    }
}

impl From<NodeRecord> for Node {
    fn from(r: NodeRecord) -> Self {
        Self {
            id: r.id,
            content: r.content,
            kind: r.kind,
            weights: r.weights,
            curvature_signature: r.curvature_signature,
            field_value: r.field_value,
            parent: r.parent,
            children: r.children,
            neighbors: r.neighbors.into_iter().map(|n| (n.id, n.strength)).collect(),
            created_at: r.created_at,
            last_used_at: r.last_used_at,
        }
    }
}

// --- Store <-> snapshot ---

impl GraphStore {
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            version: CURRENT_VERSION.to_string(),
            nodes: self.nodes().iter().map(NodeRecord::from).collect(),
            edges: self.edges().to_vec(),
            field: self.field_state().clone(),
            stability_history: self.stability_history().to_vec(),
        }
    }

    /// Rebuild a store from `snapshot`, preserving node identities and order.
    pub fn restore(config: EngineConfig, snapshot: GraphSnapshot) -> Result<Self, SnapshotError> {
        validate(&snapshot)?;
        let GraphSnapshot {
            nodes,
            edges,
            field,
            stability_history,
            ..
        } = snapshot;
        let nodes = nodes.into_iter().map(Node::from).collect();
        Ok(Self::from_parts(config, nodes, edges, field, stability_history))
    }
}

fn finite(value: f64, what: &'static str) -> Result<(), SnapshotError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SnapshotError::NonFinite(what))
    }
}

fn capacity(what: &'static str, len: usize, limit: usize) -> Result<(), SnapshotError> {
    if len > limit {
        return Err(SnapshotError::Capacity { what, len, limit });
    }
    Ok(())
}

fn validate(snapshot: &GraphSnapshot) -> Result<(), SnapshotError> {
    if snapshot.version != CURRENT_VERSION {
        return Err(SnapshotError::Version(snapshot.version.clone()));
    }

    let mut by_id: HashMap<Uuid, &NodeRecord> = HashMap::new();
    let mut contents = HashSet::new();
    for node in &snapshot.nodes {
        if by_id.insert(node.id, node).is_some() {
            return Err(SnapshotError::DuplicateNode(node.id));
        }
        if !contents.insert(normalize(&node.content)) {
            return Err(SnapshotError::DuplicateContent(node.content.clone()));
        }
        let w = &node.weights;
        for v in [w.length, w.char_index, w.stability, w.usage] {
            finite(v, "node weights")?;
        }
        finite(node.curvature_signature, "curvature signature")?;
        finite(node.field_value, "field value")?;
    }

    for node in &snapshot.nodes {
        let resolve = |id: Uuid| {
            by_id
                .get(&id)
                .copied()
                .ok_or(SnapshotError::DanglingReference {
                    node: node.id,
                    missing: id,
                })
        };

        if let Some(pid) = node.parent {
            let parent = resolve(pid)?;
            let (pn, cn) = (normalize(&parent.content), normalize(&node.content));
            let contained = parent.kind == NodeKind::Phrase && pn != cn && cn.contains(&pn);
            if !contained || !parent.children.contains(&node.id) {
                return Err(SnapshotError::ParentLink {
                    parent: pid,
                    child: node.id,
                });
            }
        }
        for &cid in &node.children {
            if resolve(cid)?.parent != Some(node.id) {
                return Err(SnapshotError::ParentLink {
                    parent: node.id,
                    child: cid,
                });
            }
        }
        for n in &node.neighbors {
            resolve(n.id)?;
            finite(n.strength, "neighbor strength")?;
        }
    }

    let mut pairs = HashSet::new();
    for edge in &snapshot.edges {
        for id in [edge.source, edge.target] {
            if !by_id.contains_key(&id) {
                return Err(SnapshotError::DanglingReference {
                    node: edge.source,
                    missing: id,
                });
            }
        }
        if !pairs.insert((edge.source, edge.target)) {
            return Err(SnapshotError::DuplicateEdge(edge.source, edge.target));
        }
        finite(edge.strength, "edge strength")?;
        finite(edge.curvature, "edge curvature")?;
    }

    let field = &snapshot.field;
    for v in [field.u, field.curvature, field.stability] {
        finite(v, "field state")?;
    }
    capacity("gradients", field.gradients.len(), GRADIENT_CAPACITY)?;
    for &g in &field.gradients {
        finite(g, "gradients")?;
    }
    capacity(
        "stability history",
        snapshot.stability_history.len(),
        STABILITY_HISTORY_CAPACITY,
    )?;
    for &s in &snapshot.stability_history {
        finite(s, "stability history")?;
    }

    Ok(())
}

impl EngineSnapshot {
    /// Validate and split into a store and a training log.
    pub fn into_parts(
        self,
        config: EngineConfig,
    ) -> Result<(GraphStore, VecDeque<TrainingEntry>), SnapshotError> {
        capacity("training log", self.memories.len(), TRAINING_LOG_CAPACITY)?;
        let store = GraphStore::restore(config, self.graph)?;
        Ok((store, self.memories.into()))
    }
}

/// Serialize a snapshot to pretty JSON.
pub fn export_json(snapshot: &EngineSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}

/// Parse a snapshot from JSON. Structural validation happens on restore.
pub fn import_json(json: &str) -> Result<EngineSnapshot, SnapshotError> {
    Ok(serde_json::from_str(json)?)
}
