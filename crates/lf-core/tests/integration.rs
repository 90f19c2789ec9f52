//! Integration tests exercising the full engine pipeline:
//! ingest → field evolution → selection → snapshot, across module boundaries.

use lf_core::constants::{GRADIENT_CAPACITY, STABILITY_HISTORY_CAPACITY, TRAINING_LOG_CAPACITY};
use lf_core::{
    Engine, EngineConfig, GraphBuilder, GraphStore, NodeKind, Phase, export_json, import_json,
};
use proptest::prelude::*;

const CONVERSATION: &[(&str, &str)] = &[
    ("hello", "hi there"),
    ("how are you", "doing well"),
    ("good morning", "good morning to you"),
    ("what is your name", "my name is field"),
    ("good night", "sleep well"),
    ("thank you", "you are welcome"),
];

fn trained() -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    for (p, r) in CONVERSATION {
        engine.learn_from(p, r);
    }
    engine
}

/// Test 1: A trained pair surfaces its response instead of an echo.
#[test]
fn trained_pair_is_answered() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.learn_from("hello", "hi there");
    assert_eq!(engine.respond("hello"), "hi there");
}

/// Test 2: Dead state echoes exactly, before and after a clear.
#[test]
fn dead_state_echoes() {
    let mut engine = Engine::new(EngineConfig::default());
    assert_eq!(engine.respond("anything"), "anything");

    let mut engine = trained();
    engine.clear_memory();
    assert_eq!(engine.stats().phase, Phase::DeadState);
    assert_eq!(engine.respond("Hello, World!"), "Hello, World!");
}

/// Test 3: Responses in a larger conversation come from the trained set.
#[test]
fn conversation_answers_from_training() {
    let mut engine = trained();
    assert_eq!(engine.respond("how are you"), "doing well");
    assert_eq!(engine.respond("what is your name"), "my name is field");
}

/// Test 4: Blank input never touches the graph.
#[test]
fn blank_input_is_noop() {
    let mut store = GraphStore::new(EngineConfig::default());
    assert!(GraphBuilder::process_input(&mut store, "", 0).is_none());
    assert!(GraphBuilder::process_input(&mut store, "   ", 0).is_none());
    assert_eq!(store.len(), 0);
    assert_eq!(store.edge_count(), 0);

    let mut engine = trained();
    let before = engine.stats();
    assert_eq!(engine.respond(" \t "), " \t ");
    assert_eq!(engine.stats(), before);
}

/// Test 5: Keyword tagging.
#[test]
fn tag_keeps_long_words() {
    let engine = Engine::new(EngineConfig::default());
    assert_eq!(engine.tag("a quick fox jumps"), vec!["quick", "jumps"]);
}

/// Test 6: Snapshot JSON round trip reproduces the graph with identical ids.
#[test]
fn snapshot_json_roundtrip() {
    let engine = trained();
    let json = export_json(&engine.snapshot()).unwrap();

    let mut restored = Engine::new(EngineConfig::default());
    restored.import(import_json(&json).unwrap()).unwrap();

    assert_eq!(restored.nodes(), engine.nodes());
    assert_eq!(restored.store().edges(), engine.store().edges());
    assert_eq!(restored.field_state(), engine.field_state());
    assert_eq!(restored.memories(), engine.memories());
    assert_eq!(restored.stats(), engine.stats());
}

/// Test 7: Restored engines answer like the engine they were taken from.
#[test]
fn restored_engine_answers_alike() {
    let mut original = trained();
    let mut restored = Engine::new(EngineConfig::default());
    restored.import(original.snapshot()).unwrap();
    assert_eq!(restored.respond("hello"), original.respond("hello"));
}

/// Test 8: Parenthood links a phrase under the phrase it contains.
#[test]
fn containment_builds_hierarchy() {
    let engine = trained();
    let store = engine.store();
    let parent = store.find_node_by_content("good morning").unwrap();
    let child = store.find_node_by_content("good morning to you").unwrap();
    assert_eq!(child.parent, Some(parent.id));
    assert!(parent.children.contains(&child.id));
    assert!(GraphBuilder::dominates(store, parent.id, child.id));
}

/// Test 9: Node kinds are counted consistently.
#[test]
fn stats_match_store() {
    let engine = trained();
    let stats = engine.stats();
    let store = engine.store();
    assert_eq!(stats.phrase_nodes, store.count_kind(NodeKind::Phrase));
    assert_eq!(stats.word_nodes, store.count_kind(NodeKind::Word));
    assert_eq!(
        stats.total_nodes,
        stats.phrase_nodes + stats.word_nodes + store.count_kind(NodeKind::Punctuation)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn histories_stay_bounded(pairs in prop::collection::vec(("[a-z]{1,6}( [a-z]{1,6}){0,3}", "[a-z]{1,6}( [a-z]{1,6}){0,3}"), 1..30)) {
        let mut engine = Engine::new(EngineConfig::default());
        for (p, r) in &pairs {
            engine.learn_from(p, r);
            engine.respond(p);
        }
        prop_assert!(engine.field_state().gradients.len() <= GRADIENT_CAPACITY);
        prop_assert!(engine.store().stability_history().len() <= STABILITY_HISTORY_CAPACITY);
        prop_assert!(engine.memories().len() <= TRAINING_LOG_CAPACITY);
        prop_assert!(engine.field_state().u.is_finite());
    }

    #[test]
    fn content_never_duplicates(text in "[A-Za-z ]{1,40}") {
        let mut store = GraphStore::new(EngineConfig::default());
        let first = store.create_node(&text, NodeKind::Phrase, None, 0);
        let second = store.create_node(&format!("  {}  ", text.to_uppercase()), NodeKind::Phrase, None, 1);
        prop_assert_eq!(first, second);
        prop_assert_eq!(store.len(), 1);
    }

    #[test]
    fn any_snapshot_restores(pairs in prop::collection::vec(("[a-z]{1,5}( [a-z]{1,5}){0,2}", "[a-z]{1,5}"), 1..10)) {
        let mut engine = Engine::new(EngineConfig::default());
        for (p, r) in &pairs {
            engine.learn_from(p, r);
        }
        let restored = GraphStore::restore(EngineConfig::default(), engine.store().snapshot());
        prop_assert!(restored.is_ok());
    }
}
