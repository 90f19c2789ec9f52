use std::collections::HashSet;

use crate::builder::{GraphBuilder, PhraseMatch};
use crate::constants::MAX_CHAIN_LENGTH;
use crate::field::curvature;
use crate::graph::GraphStore;
use crate::node::Node;
use crate::stability::{Candidate, StabilityFilter};

/// Turns input text into a response by walking the graph.
pub struct ResponseSelector;

impl ResponseSelector {
    /// Select a response for `input`.
    ///
    /// 1. Empty store: echo.
    /// 2. No matching phrase: rebuild from known words, else echo.
    /// 3. Otherwise score single-step and chain candidates per matched phrase,
    ///    return the best stable one (earliest wins ties), then the stability
    ///    fallback, then echo.
    pub fn generate_response(store: &GraphStore, input: &str) -> String {
        if store.is_empty() {
            return input.to_string();
        }

        let matches = GraphBuilder::find_matching_phrases(store, input);
        if matches.is_empty() {
            return Self::reconstruct(store, input).unwrap_or_else(|| input.to_string());
        }

        let candidates = Self::candidates(store, &matches);
        let filter = StabilityFilter::new(store);

        let mut best: Option<&Candidate> = None;
        for c in candidates.iter().filter(|c| filter.is_stable(c)) {
            if best.is_none_or(|b| c.score > b.score) {
                best = Some(c);
            }
        }
        if let Some(best) = best {
            tracing::debug!(
                score = best.score,
                considered = candidates.len(),
                "selected candidate"
            );
            return best.content.clone();
        }

        let matched: Vec<_> = matches.iter().map(|m| m.id).collect();
        match filter.fallback(&matched) {
            Some(fb) => {
                tracing::debug!(score = fb.score, "no stable candidate, using fallback");
                fb.content
            }
            None => input.to_string(),
        }
    }

    /// Join every whitespace-separated input word that is a stored node.
    fn reconstruct(store: &GraphStore, input: &str) -> Option<String> {
        let known: Vec<&str> = input
            .split_whitespace()
            .filter_map(|w| store.find_node_by_content(w))
            .map(|n| n.content.as_str())
            .collect();
        (!known.is_empty()).then(|| known.join(" "))
    }

    /// Up to two candidates per matched phrase, in match order: the strongest
    /// single step, then the phrase chain.
    pub fn candidates(store: &GraphStore, matches: &[PhraseMatch]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for m in matches {
            let Some(start) = store.node(m.id) else {
                continue;
            };
            if let Some(c) = Self::single_step(store, start) {
                out.push(c);
            }
            if let Some(c) = Self::chain(store, start) {
                out.push(c);
            }
        }
        out
    }

    /// `strength + 0.3·stability + min(0.1·usage, 0.3) - 0.1·|signature|`
    /// of the strongest successor.
    fn single_step(store: &GraphStore, start: &Node) -> Option<Candidate> {
        let link = GraphBuilder::strongest_link(store, start.id)?;
        let target = store.node(link.target)?;
        let score = link.strength + target.weights.stability * 0.3
            + (target.weights.usage * 0.1).min(0.3)
            - target.curvature_signature.abs() * 0.1;
        Some(Candidate {
            content: target.content.clone(),
            node_ids: vec![target.id],
            score,
            curvature: curvature(&[start.curvature_signature, target.curvature_signature]),
        })
    }

    /// Follow strongest links through up to three further phrases, stopping
    /// at a repeat or a non-phrase.
    ///
    /// Scored as the mean over position `i` of `stability · (1 - 0.2·i) · usage`.
    fn chain(store: &GraphStore, start: &Node) -> Option<Candidate> {
        let mut chain: Vec<&Node> = Vec::new();
        let mut visited = HashSet::from([start.id]);
        let mut current = start.id;

        while chain.len() < MAX_CHAIN_LENGTH {
            let Some(link) = GraphBuilder::strongest_link(store, current) else {
                break;
            };
            let Some(next) = store.node(link.target) else {
                break;
            };
            if !next.is_phrase() || !visited.insert(next.id) {
                break;
            }
            chain.push(next);
            current = next.id;
        }

        if chain.is_empty() {
            return None;
        }

        let score = chain
            .iter()
            .enumerate()
            .map(|(i, n)| n.weights.stability * (1.0 - i as f64 * 0.2) * n.weights.usage)
            .sum::<f64>()
            / chain.len() as f64;

        let signatures: Vec<f64> = std::iter::once(start.curvature_signature)
            .chain(chain.iter().map(|n| n.curvature_signature))
            .collect();

        Some(Candidate {
            content: chain
                .iter()
                .map(|n| n.content.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            node_ids: chain.iter().map(|n| n.id).collect(),
            score,
            curvature: curvature(&signatures),
        })
    }
}
