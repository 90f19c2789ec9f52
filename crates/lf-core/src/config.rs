use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CURVATURE_THRESHOLD, DEFAULT_LAMBDA, DEFAULT_MIN_LENGTH, DEFAULT_NU,
    DEFAULT_STABILITY_THRESHOLD,
};

/// Engine constants, fixed for the lifetime of a store.
///
/// Every field is optional when deserialized; missing keys take the defaults.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Smoothing coefficient ν on the Laplacian term.
    pub nu: f64,
    /// Stability coefficient λ on the second-gradient term.
    pub lambda: f64,
    /// Words must be longer than this to be kept by `tag`.
    pub min_length: usize,
    /// Candidates need |curvature| strictly below this.
    pub curvature_threshold: f64,
    /// Candidates need a score strictly above this.
    pub stability_threshold: f64,
    /// Reject phrase candidates whose parent is far more stable than they are.
    /// Off by default: the check only observes.
    pub enforce_parent_dominance: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nu: DEFAULT_NU,
            lambda: DEFAULT_LAMBDA,
            min_length: DEFAULT_MIN_LENGTH,
            curvature_threshold: DEFAULT_CURVATURE_THRESHOLD,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            enforce_parent_dominance: false,
        }
    }
}
