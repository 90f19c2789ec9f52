//! Discrete differential operators and the per-tick field update.
//!
//! The field is one scalar `u` shared by the whole store. Each node touched
//! during ingestion advances it by one tick:
//!
//! ```text
//! u' = u + ν·Δ(node) + R(node) + S(node) + Σ gradients + λ·G(history)
//! ```
//!
//! where Δ is the Laplacian against the node's neighbors, R the curvature
//! coupling, S the node's linguistic stability and G the mean squared second
//! difference of the stability history.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::constants::{FIELD_LIMIT, GRADIENT_CAPACITY};
use crate::node::Node;

/// Global field state of a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub u: f64,
    /// Last increments of `u`, oldest first.
    pub gradients: Vec<f64>,
    pub curvature: f64,
    pub stability: f64,
}

impl Default for FieldState {
    fn default() -> Self {
        Self {
            u: 0.0,
            gradients: Vec::new(),
            curvature: 0.0,
            stability: 1.0,
        }
    }
}

/// First differences; `[0]` when there are fewer than two samples.
pub fn discrete_derivative(xs: &[f64]) -> Vec<f64> {
    if xs.len() < 2 {
        return vec![0.0];
    }
    xs.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Mean |second difference|; 0 with fewer than three samples.
pub fn curvature(xs: &[f64]) -> f64 {
    if xs.len() < 3 {
        return 0.0;
    }
    let second = discrete_derivative(&discrete_derivative(xs));
    mean(second.iter().map(|v| v.abs()))
}

/// `mean(neighbors) - value`; 0 without neighbors.
pub fn laplacian(value: f64, neighbors: &[f64]) -> f64 {
    if neighbors.is_empty() {
        return 0.0;
    }
    mean(neighbors.iter().copied()) - value
}

pub fn ricci_influence(node: &Node, neighbor_curvatures: &[f64]) -> f64 {
    if neighbor_curvatures.is_empty() {
        return 0.0;
    }
    node.curvature_signature * mean(neighbor_curvatures.iter().copied())
}

pub fn linguistic_stability(node: &Node) -> f64 {
    node.weights.usage * node.weights.stability * 0.1
}

/// Mean squared second difference; 0 with fewer than three samples.
pub fn second_gradient_stability(history: &[f64]) -> f64 {
    if history.len() < 3 {
        return 0.0;
    }
    let second = discrete_derivative(&discrete_derivative(history));
    mean(second.iter().map(|v| v * v))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Field evolution under a fixed configuration.
#[derive(Clone, Copy, Debug)]
pub struct FieldOperator {
    pub nu: f64,
    pub lambda: f64,
    pub curvature_threshold: f64,
    pub stability_threshold: f64,
}

impl FieldOperator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            nu: config.nu,
            lambda: config.lambda,
            curvature_threshold: config.curvature_threshold,
            stability_threshold: config.stability_threshold,
        }
    }

    pub fn evolve(&self, node: &Node, neighbor_values: &[f64], neighbor_curvatures: &[f64]) -> f64 {
        self.nu * laplacian(node.field_value, neighbor_values)
            + ricci_influence(node, neighbor_curvatures)
            + linguistic_stability(node)
    }

    /// Advance the field by one tick driven by `node`.
    ///
    /// `curvature` is taken over the ramp `[0, 1, .., len(gradients)-1, u']`,
    /// not over past values of `u`.
    pub fn update_field(
        &self,
        state: &FieldState,
        node: &Node,
        neighbor_values: &[f64],
        neighbor_curvatures: &[f64],
        stability_history: &[f64],
    ) -> FieldState {
        let sgs = second_gradient_stability(stability_history);
        let raw = state.u
            + self.evolve(node, neighbor_values, neighbor_curvatures)
            + state.gradients.iter().sum::<f64>()
            + self.lambda * sgs;
        let new_u = if raw.is_nan() {
            state.u
        } else {
            raw.clamp(-FIELD_LIMIT, FIELD_LIMIT)
        };

        let mut gradients = state.gradients.clone();
        gradients.push(new_u - state.u);
        if gradients.len() > GRADIENT_CAPACITY {
            let excess = gradients.len() - GRADIENT_CAPACITY;
            gradients.drain(..excess);
        }

        let mut ramp: Vec<f64> = (0..gradients.len()).map(|i| i as f64).collect();
        ramp.push(new_u);

        FieldState {
            u: new_u,
            curvature: curvature(&ramp),
            stability: 1.0 / (1.0 + sgs.abs()),
            gradients,
        }
    }

    pub fn is_curvature_stable(&self, c: f64) -> bool {
        c.abs() < self.curvature_threshold
    }

    pub fn is_stable(&self, s: f64) -> bool {
        s > self.stability_threshold
    }
}
