use std::collections::HashMap;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{EDGE_INITIAL_STRENGTH, EDGE_STRENGTH_STEP, STABILITY_HISTORY_CAPACITY};
use crate::field::FieldState;
use crate::node::{Edge, Node, NodeKind, normalize};
use crate::weight::{WeightVector, similarity};

/// Owner of every node and edge, the global field state, and the bounded
/// stability history.
///
/// Nodes and edges live in insertion-ordered arenas. Iteration always follows
/// insertion order, which makes every tie-break downstream deterministic.
pub struct GraphStore {
    config: EngineConfig,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    field: FieldState,
    stability_history: Vec<f64>,

    node_index: HashMap<Uuid, usize>,
    content_index: HashMap<String, usize>,
    edge_index: HashMap<(Uuid, Uuid), usize>,
}

impl GraphStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
            field: FieldState::default(),
            stability_history: Vec::new(),
            node_index: HashMap::new(),
            content_index: HashMap::new(),
            edge_index: HashMap::new(),
        }
    }

    /// Assemble a store from already validated parts.
    pub(crate) fn from_parts(
        config: EngineConfig,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        field: FieldState,
        stability_history: Vec<f64>,
    ) -> Self {
        let mut store = Self {
            config,
            nodes,
            edges,
            field,
            stability_history,
            node_index: HashMap::new(),
            content_index: HashMap::new(),
            edge_index: HashMap::new(),
        };
        store.rebuild_indexes();
        store
    }

    fn rebuild_indexes(&mut self) {
        self.node_index.clear();
        self.content_index.clear();
        self.edge_index.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            self.node_index.insert(node.id, i);
            self.content_index.entry(node.normalized()).or_insert(i);
        }
        for (i, edge) in self.edges.iter().enumerate() {
            self.edge_index.insert((edge.source, edge.target), i);
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Counts ---

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    // --- Lookup ---

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.node_index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut Node> {
        self.node_index.get(&id).map(|&i| &mut self.nodes[i])
    }

    pub fn edge(&self, source: Uuid, target: Uuid) -> Option<&Edge> {
        self.edge_index.get(&(source, target)).map(|&i| &self.edges[i])
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn outgoing(&self, id: Uuid) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Phrase nodes in insertion order.
    pub fn phrases(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_phrase())
    }

    /// Exact match on normalized content.
    pub fn find_node_by_content(&self, text: &str) -> Option<&Node> {
        self.content_index
            .get(&normalize(text))
            .map(|&i| &self.nodes[i])
    }

    /// Nodes whose weight vector is at least `threshold` similar to `text`,
    /// most used first.
    pub fn find_similar_nodes(&self, text: &str, threshold: f64) -> Vec<&Node> {
        let probe = WeightVector::of(text);
        let mut matches: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| similarity(&probe, &n.weight_vector()) >= threshold)
            .collect();
        matches.sort_by(|a, b| b.weights.usage.total_cmp(&a.weights.usage));
        matches
    }

    /// Every node sharing an edge with `id`, in either direction.
    pub fn neighbors(&self, id: Uuid) -> Vec<Uuid> {
        match self.node(id) {
            Some(node) => node.neighbors.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    // --- Mutation ---

    /// Return the node for `content`, creating it on first sight.
    ///
    /// A repeat only bumps usage and `last_used_at`. A new node starts at the
    /// current field value and, if `parent` names a phrase contained in
    /// `content`, is attached beneath it.
    pub fn create_node(
        &mut self,
        content: &str,
        kind: NodeKind,
        parent: Option<Uuid>,
        now: u64,
    ) -> Uuid {
        let key = normalize(content);
        if let Some(&i) = self.content_index.get(&key) {
            let node = &mut self.nodes[i];
            node.touch(now);
            return node.id;
        }

        let node = Node::new(content.trim(), kind, self.field.u, now);
        let id = node.id;
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.node_index.insert(id, idx);
        self.content_index.insert(key, idx);

        if let Some(parent) = parent {
            if self.can_parent(parent, id) {
                self.set_parent(id, parent);
            } else {
                tracing::debug!(%parent, child = %id, "ignoring parent that does not contain-match");
            }
        }

        tracing::debug!(%id, kind = kind.as_str(), content = content.trim(), "node created");
        id
    }

    /// Create or strengthen the `from → to` edge.
    ///
    /// Returns false, changing nothing, when either endpoint is unknown.
    pub fn create_edge(&mut self, from: Uuid, to: Uuid, sequential: bool) -> bool {
        let (Some(a), Some(b)) = (self.node(from), self.node(to)) else {
            return false;
        };
        let curvature = (a.curvature_signature - b.curvature_signature).abs();

        let strength = match self.edge_index.get(&(from, to)) {
            Some(&i) => {
                let edge = &mut self.edges[i];
                edge.strength += EDGE_STRENGTH_STEP;
                edge.curvature = curvature;
                edge.strength
            }
            None => {
                self.edge_index.insert((from, to), self.edges.len());
                self.edges.push(Edge {
                    source: from,
                    target: to,
                    strength: EDGE_INITIAL_STRENGTH,
                    curvature,
                    sequential,
                });
                EDGE_INITIAL_STRENGTH
            }
        };

        if let Some(node) = self.node_mut(from) {
            node.neighbors.insert(to, strength);
        }
        if let Some(node) = self.node_mut(to) {
            node.neighbors.insert(from, strength);
        }
        true
    }

    /// Whether `parent` may sit above `child`: an existing phrase whose
    /// content is a strictly shorter substring of the child's.
    pub fn can_parent(&self, parent: Uuid, child: Uuid) -> bool {
        if parent == child {
            return false;
        }
        let (Some(p), Some(c)) = (self.node(parent), self.node(child)) else {
            return false;
        };
        let (pn, cn) = (p.normalized(), c.normalized());
        p.is_phrase() && pn != cn && cn.contains(&pn)
    }

    /// Re-home `child` under `parent`, keeping both sides of the link in step.
    /// Returns false when `parent` already was the child's parent.
    pub(crate) fn set_parent(&mut self, child: Uuid, parent: Uuid) -> bool {
        let old = self.node(child).and_then(|n| n.parent);
        if old == Some(parent) {
            return false;
        }
        if let Some(old) = old
            && let Some(old_node) = self.node_mut(old)
        {
            old_node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent)
            && !p.children.contains(&child)
        {
            p.children.push(child);
        }
        true
    }

    // --- Field state ---

    pub fn field_state(&self) -> &FieldState {
        &self.field
    }

    /// Replace the field state and record its stability in the history.
    pub fn set_field_state(&mut self, state: FieldState) {
        self.stability_history.push(state.stability);
        if self.stability_history.len() > STABILITY_HISTORY_CAPACITY {
            let excess = self.stability_history.len() - STABILITY_HISTORY_CAPACITY;
            self.stability_history.drain(..excess);
        }
        self.field = state;
    }

    pub fn stability_history(&self) -> &[f64] {
        &self.stability_history
    }

    /// Back to the dead state: no nodes, no edges, zero field, no history.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.field = FieldState::default();
        self.stability_history.clear();
        self.rebuild_indexes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store() -> GraphStore {
        GraphStore::new(EngineConfig::default())
    }

    #[test]
    fn test_create_node_dedups_normalized_content() {
        let mut s = store();
        let a = s.create_node("Hello", NodeKind::Word, None, 10);
        let b = s.create_node("  hello  ", NodeKind::Word, None, 20);
        assert_eq!(a, b);
        assert_eq!(s.len(), 1);
        let n = s.node(a).unwrap();
        assert_eq!(n.weights.usage, 2.0);
        assert_eq!(n.last_used_at, 20);
        assert_eq!(n.created_at, 10);
        assert_eq!(n.content, "Hello");
    }

    #[test]
    fn test_new_node_samples_current_field() {
        let mut s = store();
        s.set_field_state(FieldState {
            u: 2.5,
            ..FieldState::default()
        });
        let id = s.create_node("x", NodeKind::Word, None, 0);
        assert_eq!(s.node(id).unwrap().field_value, 2.5);
    }

    #[test]
    fn test_create_node_with_parent_links_both_sides() {
        let mut s = store();
        let p = s.create_node("hello", NodeKind::Phrase, None, 0);
        let c = s.create_node("hello world", NodeKind::Phrase, Some(p), 0);
        assert_eq!(s.node(c).unwrap().parent, Some(p));
        assert_eq!(s.node(p).unwrap().children, vec![c]);
    }

    #[test]
    fn test_create_node_ignores_invalid_parent() {
        let mut s = store();
        let p = s.create_node("goodbye", NodeKind::Phrase, None, 0);
        let c = s.create_node("hello world", NodeKind::Phrase, Some(p), 0);
        assert!(s.node(c).unwrap().parent.is_none());
        assert!(s.node(p).unwrap().children.is_empty());

        let w = s.create_node("hi", NodeKind::Word, None, 0);
        let c2 = s.create_node("hi there", NodeKind::Phrase, Some(w), 0);
        assert!(s.node(c2).unwrap().parent.is_none(), "word cannot be a parent");
    }

    #[test]
    fn test_create_edge_strengthens() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        let b = s.create_node("b", NodeKind::Word, None, 0);
        assert!(s.create_edge(a, b, true));
        assert!(s.create_edge(a, b, true));
        assert!(s.create_edge(a, b, true));
        assert_eq!(s.edge_count(), 1);
        let e = s.edge(a, b).unwrap();
        assert_relative_eq!(e.strength, 1.2);
        assert_relative_eq!(s.node(a).unwrap().neighbors[&b], 1.2);
        assert_relative_eq!(s.node(b).unwrap().neighbors[&a], 1.2);
    }

    #[test]
    fn test_reverse_pair_is_distinct_edge() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        let b = s.create_node("b", NodeKind::Word, None, 0);
        s.create_edge(a, b, true);
        s.create_edge(b, a, false);
        assert_eq!(s.edge_count(), 2);
        assert!(s.edge(b, a).is_some_and(|e| !e.sequential));
    }

    #[test]
    fn test_edge_curvature_is_signature_gap() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        let b = s.create_node("b", NodeKind::Word, None, 0);
        s.create_edge(a, b, true);
        let expected =
            (s.node(a).unwrap().curvature_signature - s.node(b).unwrap().curvature_signature).abs();
        assert_relative_eq!(s.edge(a, b).unwrap().curvature, expected);
    }

    #[test]
    fn test_create_edge_unknown_endpoint_is_noop() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        assert!(!s.create_edge(a, Uuid::new_v4(), true));
        assert!(!s.create_edge(Uuid::new_v4(), a, true));
        assert_eq!(s.edge_count(), 0);
        assert!(s.node(a).unwrap().neighbors.is_empty());
    }

    #[test]
    fn test_find_node_by_content() {
        let mut s = store();
        let id = s.create_node("Rust", NodeKind::Word, None, 0);
        assert_eq!(s.find_node_by_content(" rust ").map(|n| n.id), Some(id));
        assert!(s.find_node_by_content("go").is_none());
    }

    #[test]
    fn test_find_similar_nodes_sorted_by_usage() {
        let mut s = store();
        let a = s.create_node("cat", NodeKind::Word, None, 0);
        let b = s.create_node("cot", NodeKind::Word, None, 0);
        s.create_node("cot", NodeKind::Word, None, 0);
        let similar = s.find_similar_nodes("cat", 0.0);
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].id, b);
        assert_eq!(similar[1].id, a);
        assert!(s.find_similar_nodes("cat", 1.01).is_empty());
    }

    #[test]
    fn test_neighbors_both_directions_deduped() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        let b = s.create_node("b", NodeKind::Word, None, 0);
        let c = s.create_node("c", NodeKind::Word, None, 0);
        s.create_edge(a, b, true);
        s.create_edge(b, a, true);
        s.create_edge(c, a, false);
        let mut n = s.neighbors(a);
        n.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(n, expected);
        assert!(s.neighbors(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_stability_history_bounded() {
        let mut s = store();
        for i in 0..50 {
            s.set_field_state(FieldState {
                stability: i as f64,
                ..FieldState::default()
            });
        }
        assert_eq!(s.stability_history().len(), STABILITY_HISTORY_CAPACITY);
        assert_eq!(s.stability_history()[0], 30.0);
        assert_eq!(*s.stability_history().last().unwrap(), 49.0);
    }

    #[test]
    fn test_set_parent_moves_child() {
        let mut s = store();
        let p1 = s.create_node("a", NodeKind::Phrase, None, 0);
        let p2 = s.create_node("a b", NodeKind::Phrase, None, 0);
        let c = s.create_node("a b c", NodeKind::Phrase, Some(p1), 0);
        assert!(s.set_parent(c, p2));
        assert!(!s.set_parent(c, p2));
        assert!(s.node(p1).unwrap().children.is_empty());
        assert_eq!(s.node(p2).unwrap().children, vec![c]);
        assert_eq!(s.node(c).unwrap().parent, Some(p2));
    }

    #[test]
    fn test_clear_resets_to_dead_state() {
        let mut s = store();
        let a = s.create_node("a", NodeKind::Word, None, 0);
        let b = s.create_node("b", NodeKind::Word, None, 0);
        s.create_edge(a, b, true);
        s.set_field_state(FieldState {
            u: 3.0,
            ..FieldState::default()
        });
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.edge_count(), 0);
        assert_eq!(s.field_state(), &FieldState::default());
        assert!(s.stability_history().is_empty());
        assert!(s.find_node_by_content("a").is_none());
    }
}
