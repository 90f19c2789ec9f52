use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MS_PER_DAY;
use crate::weight::{
    INITIAL_STABILITY, INITIAL_USAGE, WeightVector, char_index_weight, curvature_signature,
    length_weight,
};

/// What a node stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A single `[A-Za-z0-9]+` token.
    Word,
    /// A whole submitted utterance.
    Phrase,
    /// Any other single token.
    Punctuation,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Phrase => "phrase",
            Self::Punctuation => "punctuation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "word" => Some(Self::Word),
            "phrase" => Some(Self::Phrase),
            "punctuation" => Some(Self::Punctuation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWeights {
    pub length: f64,
    pub char_index: f64,
    pub stability: f64,
    pub usage: f64,
}

impl NodeWeights {
    pub fn for_text(text: &str) -> Self {
        Self {
            length: length_weight(text),
            char_index: char_index_weight(text),
            stability: INITIAL_STABILITY,
            usage: INITIAL_USAGE,
        }
    }
}

/// A word, punctuation mark, or phrase in the graph.
///
/// `parent`, `children` and `neighbors` hold identifiers only; the store owns
/// every node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: Uuid,
    pub content: String,
    pub kind: NodeKind,
    pub weights: NodeWeights,
    pub curvature_signature: f64,
    pub field_value: f64,
    pub parent: Option<Uuid>,
    pub children: Vec<Uuid>,
    pub neighbors: BTreeMap<Uuid, f64>,
    pub created_at: u64,
    pub last_used_at: u64,
}

impl Node {
    pub fn new(content: &str, kind: NodeKind, field_value: f64, now: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind,
            weights: NodeWeights::for_text(content),
            curvature_signature: curvature_signature(content),
            field_value,
            parent: None,
            children: Vec::new(),
            neighbors: BTreeMap::new(),
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn is_phrase(&self) -> bool {
        self.kind == NodeKind::Phrase
    }

    /// Lowercased, trimmed content used for deduplication and matching.
    pub fn normalized(&self) -> String {
        normalize(&self.content)
    }

    pub fn weight_vector(&self) -> WeightVector {
        WeightVector {
            length: self.weights.length,
            char_index: self.weights.char_index,
            curvature: self.curvature_signature,
        }
    }

    pub fn age_days(&self, now: u64) -> f64 {
        now.saturating_sub(self.created_at) as f64 / MS_PER_DAY
    }

    /// Record that this node was seen again.
    pub fn touch(&mut self, now: u64) {
        self.weights.usage += 1.0;
        self.last_used_at = now;
    }
}

/// Case-insensitive, whitespace-trimmed form of `text`.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A directed, weighted relation. `(source, target)` is unique per store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: Uuid,
    pub target: Uuid,
    pub strength: f64,
    pub curvature: f64,
    /// True when `source` was immediately followed by `target` in some input;
    /// false for phrase membership and containment.
    pub sequential: bool,
}
