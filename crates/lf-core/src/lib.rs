//! Phrase knowledge-graph engine.
//!
//! Text is ingested into a graph of word, punctuation and phrase nodes joined
//! by sequential and structural edges. A single scalar field evolves as nodes
//! are touched, and responses are chosen by walking the strongest links from
//! the phrases that match the input, filtered by curvature and stability.
//!
//! Zero I/O: persistence goes through the caller-supplied `SnapshotPort`.

pub mod builder;
pub mod config;
pub mod constants;
pub mod engine;
pub mod field;
pub mod graph;
pub mod node;
pub mod selector;
pub mod snapshot;
pub mod stability;
pub mod time;
pub mod tokenizer;
pub mod weight;

pub use builder::{GraphBuilder, Ingested, Link, PhraseMatch};
pub use config::EngineConfig;
pub use engine::{Engine, Phase, Stats, TrainingEntry};
pub use field::{FieldOperator, FieldState};
pub use graph::GraphStore;
pub use node::{Edge, Node, NodeKind, NodeWeights};
pub use selector::ResponseSelector;
pub use snapshot::{
    CURRENT_VERSION, EngineSnapshot, GraphSnapshot, NeighborRecord, NodeRecord, PortError,
    SnapshotError, SnapshotPort, export_json, import_json,
};
pub use stability::{Candidate, StabilityFilter};
pub use time::{millis_to_iso8601, now_unix_millis};
pub use tokenizer::{Token, tokenize};
pub use weight::{WeightVector, similarity};
