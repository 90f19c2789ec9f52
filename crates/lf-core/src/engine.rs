use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::builder::GraphBuilder;
use crate::config::EngineConfig;
use crate::constants::{
    MAX_STABILITY, REINFORCE_STABILITY_STEP, REINFORCE_USAGE_STEP, TRAINING_LOG_CAPACITY,
};
use crate::field::{FieldOperator, FieldState};
use crate::graph::GraphStore;
use crate::node::{Node, NodeKind};
use crate::selector::ResponseSelector;
use crate::snapshot::{EngineSnapshot, SnapshotError, SnapshotPort};
use crate::stability::StabilityFilter;
use crate::time::now_unix_millis;
use crate::tokenizer::split_words;

/// One `learn_from` call, as recorded in the training log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingEntry {
    pub prompt: String,
    pub response: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// Coarse label describing how developed the graph is. Observational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    DeadState,
    NodeCreation,
    NeighborhoodGrowth,
    FieldEvolution,
    ResponseLoop,
    MultiPhraseChain,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DeadState => "Dead State",
            Self::NodeCreation => "Node Creation",
            Self::NeighborhoodGrowth => "Neighborhood Growth",
            Self::FieldEvolution => "Field Evolution",
            Self::ResponseLoop => "Response Loop",
            Self::MultiPhraseChain => "Multi-Phrase Chain",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_nodes: usize,
    pub phrase_nodes: usize,
    pub word_nodes: usize,
    pub total_edges: usize,
    pub field_value: f64,
    pub curvature: f64,
    pub stability: f64,
    pub phase: Phase,
}

/// The engine handle: one graph store, its training log, and an optional
/// snapshot port written after every mutating call.
///
/// Calls must not interleave. Share an engine between tasks behind one lock.
pub struct Engine {
    store: GraphStore,
    log: VecDeque<TrainingEntry>,
    port: Option<Box<dyn SnapshotPort>>,
}

impl Engine {
    /// An in-memory engine in the dead state.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: GraphStore::new(config),
            log: VecDeque::new(),
            port: None,
        }
    }

    /// Load the last snapshot from `port` and keep writing through it.
    ///
    /// A missing, unreadable or invalid snapshot leaves the engine in the
    /// dead state.
    pub fn open(config: EngineConfig, mut port: Box<dyn SnapshotPort>) -> Self {
        let mut engine = Self::new(config);
        match port.load() {
            Ok(Some(snapshot)) => match snapshot.into_parts(config) {
                Ok((store, log)) => {
                    tracing::debug!(nodes = store.len(), memories = log.len(), "snapshot restored");
                    engine.store = store;
                    engine.log = log;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding invalid snapshot, starting empty");
                }
            },
            Ok(None) => tracing::debug!("no snapshot, starting empty"),
            Err(e) => tracing::warn!(error = %e, "failed to load snapshot, starting empty"),
        }
        engine.port = Some(port);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        self.store.config()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Ingest `text`, evolve the field over it, and answer.
    ///
    /// Blank input changes nothing and is echoed. On an empty store the
    /// input is still learned but echoed back exactly.
    pub fn respond(&mut self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let was_dead = self.store.is_empty();
        let now = now_unix_millis();

        GraphBuilder::process_input(&mut self.store, text, now);
        self.evolve_field(text, now);

        let response = if was_dead {
            text.to_string()
        } else {
            ResponseSelector::generate_response(&self.store, text)
        };
        self.persist();
        response
    }

    /// Learn that `response` follows `prompt`. Nothing happens when both
    /// sides are blank.
    pub fn learn_from(&mut self, prompt: &str, response: &str) {
        if prompt.trim().is_empty() && response.trim().is_empty() {
            return;
        }
        let now = now_unix_millis();
        GraphBuilder::process_training_pair(&mut self.store, prompt, response, now);
        self.evolve_field(prompt, now);
        self.evolve_field(response, now);
        self.reinforce(prompt, response);

        self.log.push_back(TrainingEntry {
            prompt: prompt.to_string(),
            response: response.to_string(),
            timestamp: now,
        });
        while self.log.len() > TRAINING_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.persist();
    }

    /// Re-ingest `text` and advance the field once per touched node.
    fn evolve_field(&mut self, text: &str, now: u64) {
        let Some(ingested) = GraphBuilder::process_input(&mut self.store, text, now) else {
            return;
        };
        let operator = FieldOperator::new(self.store.config());

        for id in &ingested.touched {
            let Some(node) = self.store.node(*id) else {
                continue;
            };
            let (values, curvatures): (Vec<f64>, Vec<f64>) = self
                .store
                .neighbors(*id)
                .into_iter()
                .filter_map(|n| self.store.node(n))
                .map(|n| (n.field_value, n.curvature_signature))
                .unzip();
            let next = operator.update_field(
                self.store.field_state(),
                node,
                &values,
                &curvatures,
                self.store.stability_history(),
            );
            let u = next.u;
            self.store.set_field_state(next);
            if let Some(node) = self.store.node_mut(*id) {
                node.field_value = u;
            }
        }

        tracing::debug!(
            ticks = ingested.touched.len(),
            u = self.store.field_state().u,
            "field evolved"
        );
    }

    /// Raise stability and usage of every phrase matching either text, once
    /// per phrase.
    fn reinforce(&mut self, prompt: &str, response: &str) {
        let mut ids: Vec<Uuid> = Vec::new();
        for text in [prompt, response] {
            for m in GraphBuilder::find_matching_phrases(&self.store, text) {
                if !ids.contains(&m.id) {
                    ids.push(m.id);
                }
            }
        }
        for id in &ids {
            if let Some(node) = self.store.node_mut(*id) {
                node.weights.stability =
                    (node.weights.stability + REINFORCE_STABILITY_STEP).min(MAX_STABILITY);
                node.weights.usage += REINFORCE_USAGE_STEP;
            }
        }
        tracing::debug!(reinforced = ids.len(), "phrases reinforced");
    }

    pub fn phase(&self) -> Phase {
        let phrases = self.store.count_kind(NodeKind::Phrase);
        if self.store.is_empty() {
            Phase::DeadState
        } else if phrases < 5 {
            Phase::NodeCreation
        } else if self.store.edge_count() < 10 {
            Phase::NeighborhoodGrowth
        } else if self.store.field_state().stability > 0.7 {
            Phase::FieldEvolution
        } else if phrases > 20 {
            Phase::ResponseLoop
        } else {
            Phase::MultiPhraseChain
        }
    }

    pub fn stats(&self) -> Stats {
        let field = self.store.field_state();
        Stats {
            total_nodes: self.store.len(),
            phrase_nodes: self.store.count_kind(NodeKind::Phrase),
            word_nodes: self.store.count_kind(NodeKind::Word),
            total_edges: self.store.edge_count(),
            field_value: field.u,
            curvature: field.curvature,
            stability: field.stability,
            phase: self.phase(),
        }
    }

    /// Training log, most recent first.
    pub fn memories(&self) -> Vec<TrainingEntry> {
        self.log.iter().rev().cloned().collect()
    }

    pub fn field_state(&self) -> &FieldState {
        self.store.field_state()
    }

    pub fn nodes(&self) -> &[Node] {
        self.store.nodes()
    }

    /// Rarely used, weakly stable nodes. Nothing is removed.
    pub fn unstable_nodes(&self) -> Vec<&Node> {
        StabilityFilter::new(&self.store).unstable_nodes(now_unix_millis())
    }

    /// Back to the dead state, including the durable snapshot.
    pub fn clear_memory(&mut self) {
        self.store.clear();
        self.log.clear();
        if let Some(port) = self.port.as_mut()
            && let Err(e) = port.erase()
        {
            tracing::error!(error = %e, "failed to erase snapshot");
        }
    }

    /// Lowercase words longer than the configured minimum length.
    pub fn tag(&self, text: &str) -> Vec<String> {
        let min = self.store.config().min_length;
        split_words(text)
            .into_iter()
            .filter(|w| w.chars().count() > min)
            .collect()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            graph: self.store.snapshot(),
            memories: self.log.iter().cloned().collect(),
        }
    }

    /// Replace the whole state with `snapshot`. On error nothing changes.
    pub fn import(&mut self, snapshot: EngineSnapshot) -> Result<(), SnapshotError> {
        let (store, log) = snapshot.into_parts(*self.store.config())?;
        self.store = store;
        self.log = log;
        self.persist();
        Ok(())
    }

    fn persist(&mut self) {
        if self.port.is_none() {
            return;
        }
        let snapshot = self.snapshot();
        if let Some(port) = self.port.as_mut()
            && let Err(e) = port.save(&snapshot)
        {
            tracing::error!(error = %e, "failed to save snapshot");
        }
    }
}
