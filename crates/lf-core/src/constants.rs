/// Default smoothing coefficient ν applied to the Laplacian term.
pub const DEFAULT_NU: f64 = 0.1;

/// Default stability coefficient λ applied to the second-gradient term.
pub const DEFAULT_LAMBDA: f64 = 0.05;

/// Default minimum word length; `tag` keeps words strictly longer than this.
pub const DEFAULT_MIN_LENGTH: usize = 3;

/// Default bound on |curvature| for a candidate to be accepted.
pub const DEFAULT_CURVATURE_THRESHOLD: f64 = 0.5;

/// Default score a candidate must exceed to be accepted.
pub const DEFAULT_STABILITY_THRESHOLD: f64 = 0.3;

/// Field gradients retained in `FieldState::gradients`.
pub const GRADIENT_CAPACITY: usize = 10;

/// Stability samples retained for the second-gradient computation.
pub const STABILITY_HISTORY_CAPACITY: usize = 20;

/// Training log entries retained by the engine.
pub const TRAINING_LOG_CAPACITY: usize = 100;

/// Strength of a freshly created edge.
pub const EDGE_INITIAL_STRENGTH: f64 = 1.0;

/// Strength added each time an existing edge is observed again.
pub const EDGE_STRENGTH_STEP: f64 = 0.1;

/// Ceiling for reinforced node stability.
pub const MAX_STABILITY: f64 = 2.0;

/// Stability added to matching phrases by `learn_from`.
pub const REINFORCE_STABILITY_STEP: f64 = 0.1;

/// Usage added to matching phrases by `learn_from`.
pub const REINFORCE_USAGE_STEP: f64 = 0.5;

/// Magnitude cap on the field scalar `u`. Keeps the gradient feedback finite.
pub const FIELD_LIMIT: f64 = 1e12;

/// Maximum number of further phrases followed by a chain candidate.
pub const MAX_CHAIN_LENGTH: usize = 3;

/// Milliseconds per day, for node age.
pub const MS_PER_DAY: f64 = 86_400_000.0;
