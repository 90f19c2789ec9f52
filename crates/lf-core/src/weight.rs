//! Scalar weights and curvature signature for a piece of text.
//!
//! Stateless: every function here depends only on its input.

use serde::{Deserialize, Serialize};

/// Stability assigned to a new node.
pub const INITIAL_STABILITY: f64 = 1.0;

/// Usage assigned to a new node.
pub const INITIAL_USAGE: f64 = 1.0;

/// `min(chars / 10, 1.0)`.
pub fn length_weight(text: &str) -> f64 {
    (text.chars().count() as f64 / 10.0).min(1.0)
}

/// Mean of `(codepoint mod 128) / 128` over the characters; 0 for empty text.
pub fn char_index_weight(text: &str) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for c in text.chars() {
        sum += (c as u32 % 128) as f64 / 128.0;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Rolling `h = h*31 + codepoint` hash wrapped to i32, squashed by `tanh(h / 1e6)`.
pub fn curvature_signature(text: &str) -> f64 {
    let mut h: i32 = 0;
    for c in text.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as u32 as i32);
    }
    (h as f64 / 1_000_000.0).tanh()
}

/// The three comparable scalars of a node or raw text.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub length: f64,
    pub char_index: f64,
    pub curvature: f64,
}

impl WeightVector {
    pub fn of(text: &str) -> Self {
        Self {
            length: length_weight(text),
            char_index: char_index_weight(text),
            curvature: curvature_signature(text),
        }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        let dl = self.length - other.length;
        let dc = self.char_index - other.char_index;
        let dk = self.curvature - other.curvature;
        (dl * dl + dc * dc + dk * dk).sqrt()
    }
}

/// `1 / (1 + euclidean distance)`, always in (0, 1].
pub fn similarity(a: &WeightVector, b: &WeightVector) -> f64 {
    1.0 / (1.0 + a.distance(b))
}
