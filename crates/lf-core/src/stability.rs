use uuid::Uuid;

use crate::builder::GraphBuilder;
use crate::field::FieldOperator;
use crate::graph::GraphStore;
use crate::node::Node;

/// A possible response, before filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub content: String,
    pub node_ids: Vec<Uuid>,
    pub score: f64,
    pub curvature: f64,
}

/// Accepts or rejects candidates against the store's thresholds.
pub struct StabilityFilter<'a> {
    store: &'a GraphStore,
    operator: FieldOperator,
    enforce_parent_dominance: bool,
}

impl<'a> StabilityFilter<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        let config = store.config();
        Self {
            store,
            operator: FieldOperator::new(config),
            enforce_parent_dominance: config.enforce_parent_dominance,
        }
    }

    /// Curvature under threshold, non-empty content and nodes, the parent
    /// dominance check, and a score over threshold. All must hold.
    pub fn is_stable(&self, candidate: &Candidate) -> bool {
        self.operator.is_curvature_stable(candidate.curvature)
            && !candidate.content.is_empty()
            && !candidate.node_ids.is_empty()
            && self.parent_dominance_permits(candidate)
            && self.operator.is_stable(candidate.score)
    }

    /// A phrase node whose parent is more than 1.5× as stable is "dominated".
    /// Dominated candidates pass unless `enforce_parent_dominance` is set.
    fn parent_dominance_permits(&self, candidate: &Candidate) -> bool {
        for id in &candidate.node_ids {
            let Some(node) = self.store.node(*id) else {
                continue;
            };
            let Some(parent) = node.parent.and_then(|p| self.store.node(p)) else {
                continue;
            };
            if node.is_phrase() && parent.weights.stability > node.weights.stability * 1.5 {
                if self.enforce_parent_dominance {
                    return false;
                }
                tracing::trace!(node = %node.id, parent = %parent.id, "dominated by parent, permitted");
            }
        }
        true
    }

    /// The single most stable node across the ancestor chains of `matched`
    /// (each chain includes its starting node), as a candidate scored by that
    /// stability. `None` when nothing has positive stability.
    pub fn fallback(&self, matched: &[Uuid]) -> Option<Candidate> {
        let mut best: Option<&Node> = None;
        let mut best_stability = 0.0;

        for &start in matched {
            let chain = std::iter::once(start).chain(GraphBuilder::parent_chain(self.store, start));
            for id in chain {
                let Some(node) = self.store.node(id) else {
                    continue;
                };
                if node.weights.stability > best_stability {
                    best_stability = node.weights.stability;
                    best = Some(node);
                }
            }
        }

        best.map(|node| Candidate {
            content: node.content.clone(),
            node_ids: vec![node.id],
            score: best_stability,
            curvature: 0.0,
        })
    }

    /// Nodes that are rarely used for their age and weakly stable:
    /// `usage / (age_days + 1) < 0.1` and `stability < 0.5`. Read-only.
    pub fn unstable_nodes(&self, now: u64) -> Vec<&'a Node> {
        self.store
            .nodes()
            .iter()
            .filter(|n| {
                n.weights.usage / (n.age_days(now) + 1.0) < 0.1 && n.weights.stability < 0.5
            })
            .collect()
    }
}
