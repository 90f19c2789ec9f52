use std::collections::HashSet;

use uuid::Uuid;

use crate::graph::GraphStore;
use crate::node::{NodeKind, normalize};
use crate::tokenizer::tokenize;

/// Nodes created or reinforced by one `process_input` call.
#[derive(Clone, Debug, PartialEq)]
pub struct Ingested {
    /// The node standing for the whole trimmed text.
    pub phrase: Uuid,
    /// Phrase first, then one entry per token occurrence in order.
    pub touched: Vec<Uuid>,
}

/// A stored phrase scored against some input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhraseMatch {
    pub id: Uuid,
    pub score: f64,
}

/// Best outgoing sequential edge of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    pub target: Uuid,
    pub strength: f64,
    pub score: f64,
}

/// Stateless graph construction and lookup over a `GraphStore`.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Ingest one utterance: a phrase node, one node per token, structural
    /// phrase→token edges, sequential token→token edges, then parenthood.
    ///
    /// Blank input is a no-op and returns `None`.
    pub fn process_input(store: &mut GraphStore, text: &str, now: u64) -> Option<Ingested> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let phrase = store.create_node(trimmed, NodeKind::Phrase, None, now);
        let mut touched = vec![phrase];
        let mut prev: Option<Uuid> = None;

        for token in tokenize(trimmed) {
            let id = store.create_node(&token.text, token.kind, None, now);
            store.create_edge(phrase, id, false);
            if let Some(prev) = prev {
                store.create_edge(prev, id, true);
            }
            prev = Some(id);
            touched.push(id);
        }

        Self::establish_parenthood(store, phrase);

        tracing::debug!(%phrase, tokens = touched.len() - 1, "ingested input");
        Some(Ingested { phrase, touched })
    }

    /// Link `new` into the containment hierarchy against every other phrase.
    ///
    /// For each existing phrase contained in `new`, `new` adopts it as parent
    /// if it has none yet or the candidate is longer than the parent assigned
    /// at that moment, so the outcome follows phrase insertion order. For each
    /// existing phrase that contains `new`, that phrase is re-parented under
    /// `new`. Every change of parent adds a structural child→parent edge.
    pub fn establish_parenthood(store: &mut GraphStore, new: Uuid) {
        let Some(node) = store.node(new).filter(|n| n.is_phrase()) else {
            return;
        };
        let new_norm = node.normalized();
        let others: Vec<(Uuid, String)> = store
            .phrases()
            .filter(|p| p.id != new)
            .map(|p| (p.id, p.normalized()))
            .collect();

        for (existing, ex_norm) in others {
            if ex_norm == new_norm {
                continue;
            }

            if new_norm.contains(&ex_norm) {
                let current = store.node(new).and_then(|n| n.parent);
                let adopt = match current.and_then(|p| store.node(p)) {
                    None => true,
                    Some(p) => ex_norm.chars().count() > p.normalized().chars().count(),
                };
                if adopt && store.set_parent(new, existing) {
                    store.create_edge(new, existing, false);
                }
            }

            if ex_norm.contains(&new_norm) && store.set_parent(existing, new) {
                store.create_edge(existing, new, false);
            }
        }
    }

    /// Ingest both texts and link prompt phrase → response phrase.
    pub fn process_training_pair(
        store: &mut GraphStore,
        prompt: &str,
        response: &str,
        now: u64,
    ) -> (Option<Ingested>, Option<Ingested>) {
        let p = Self::process_input(store, prompt, now);
        let r = Self::process_input(store, response, now);
        if let (Some(p), Some(r)) = (&p, &r) {
            store.create_edge(p.phrase, r.phrase, true);
        }
        (p, r)
    }

    /// Score every stored phrase against `input`, best first.
    ///
    /// Exact normalized match scores 1. Containment either way scores the
    /// length ratio. Otherwise half the shared-word fraction. Zero scores are
    /// dropped; ties keep phrase insertion order.
    pub fn find_matching_phrases(store: &GraphStore, input: &str) -> Vec<PhraseMatch> {
        let input = normalize(input);
        if input.is_empty() {
            return Vec::new();
        }
        let input_len = input.chars().count();
        let input_words: HashSet<&str> = input.split_whitespace().collect();

        let mut matches: Vec<PhraseMatch> = store
            .phrases()
            .filter_map(|phrase| {
                let p = phrase.normalized();
                let score = if p == input {
                    1.0
                } else if p.contains(&input) || input.contains(&p) {
                    let p_len = p.chars().count();
                    input_len.min(p_len) as f64 / input_len.max(p_len) as f64
                } else {
                    let words: Vec<&str> = p.split_whitespace().collect();
                    let distinct: HashSet<&str> = words.iter().copied().collect();
                    let shared = distinct.intersection(&input_words).count();
                    let denom = input_words.len().max(words.len());
                    if denom == 0 {
                        0.0
                    } else {
                        shared as f64 / denom as f64 * 0.5
                    }
                };
                (score > 0.0).then_some(PhraseMatch {
                    id: phrase.id,
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }

    /// Best sequential successor of `from`.
    ///
    /// Ranked by `strength + bonus + 0.2·stability(target)`, where the 0.5
    /// bonus goes to targets that are *not* children of `from`: the walk
    /// prefers broader phrases over narrower ones.
    pub fn strongest_link(store: &GraphStore, from: Uuid) -> Option<Link> {
        let mut best: Option<Link> = None;
        for edge in store.outgoing(from).filter(|e| e.sequential) {
            let Some(target) = store.node(edge.target) else {
                continue;
            };
            let bonus = if target.parent == Some(from) { 0.0 } else { 0.5 };
            let score = edge.strength + bonus + target.weights.stability * 0.2;
            if best.is_none_or(|b| score > b.score) {
                best = Some(Link {
                    target: edge.target,
                    strength: edge.strength,
                    score,
                });
            }
        }
        best
    }

    /// Ancestors of `id`, nearest first. Stops at the root or at a repeat.
    pub fn parent_chain(store: &GraphStore, id: Uuid) -> Vec<Uuid> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = store.node(id).and_then(|n| n.parent);
        while let Some(p) = current {
            if !seen.insert(p) {
                break;
            }
            chain.push(p);
            current = store.node(p).and_then(|n| n.parent);
        }
        chain
    }

    /// True iff `a` is an ancestor of `b`.
    pub fn dominates(store: &GraphStore, a: Uuid, b: Uuid) -> bool {
        Self::parent_chain(store, b).contains(&a)
    }
}
