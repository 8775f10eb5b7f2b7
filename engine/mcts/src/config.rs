//! MCTS configuration parameters.

use crate::search::SearchError;

/// Configuration for Monte Carlo Tree Search.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Simulation budget per search. Root expansion counts as the first
    /// simulation.
    pub max_steps: u32,

    /// Exploration constant multiplying the prior term of the score.
    pub exploration: f32,

    /// Per-edge discount on backed-up values, also applied to the
    /// exploration bonus as `decay^distance`. Must lie in `(0, 1]`.
    pub decay: f32,

    /// Dirichlet alpha for root noise. `None` disables noise (evaluation).
    pub dirichlet_const: Option<f32>,

    /// Fraction of each root prior replaced by noise.
    /// AlphaZero uses 0.25, meaning 75% prior + 25% noise.
    pub dirichlet_weight: f32,

    /// Maximum selection depth below the root.
    pub max_depth: u32,

    /// Share nodes between transpositions within one search.
    pub use_transposition_table: bool,

    /// Worker threads per search. 1 runs simulations on the caller's thread.
    pub search_threads: usize,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            max_steps: 1600,
            exploration: 1.0,
            decay: 0.95,
            dirichlet_const: Some(1.0 / 12.0),
            dirichlet_weight: 0.25,
            max_depth: 900,
            use_transposition_table: true,
            search_threads: 1,
        }
    }
}

impl MctsConfig {
    /// Create config for self-play (with root noise).
    pub fn for_training() -> Self {
        Self::default()
    }

    /// Create config for evaluation games (no noise).
    pub fn for_evaluation() -> Self {
        Self {
            dirichlet_const: None,
            ..Self::default()
        }
    }

    /// Create a fast config for testing.
    pub fn for_testing() -> Self {
        Self {
            max_steps: 64,
            dirichlet_const: None,
            max_depth: 32,
            ..Self::default()
        }
    }

    /// Builder pattern: set the simulation budget.
    pub fn with_max_steps(mut self, n: u32) -> Self {
        self.max_steps = n;
        self
    }

    /// Builder pattern: set the exploration constant.
    pub fn with_exploration(mut self, c: f32) -> Self {
        self.exploration = c;
        self
    }

    pub fn with_decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_dirichlet(mut self, alpha: Option<f32>) -> Self {
        self.dirichlet_const = alpha;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_transposition_table(mut self, enabled: bool) -> Self {
        self.use_transposition_table = enabled;
        self
    }

    pub fn with_search_threads(mut self, threads: usize) -> Self {
        self.search_threads = threads;
        self
    }

    /// Reject settings the search cannot run with.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_steps == 0 {
            return Err(SearchError::InvalidConfig("max_steps must be >= 1".into()));
        }
        if !(self.exploration.is_finite() && self.exploration >= 0.0) {
            return Err(SearchError::InvalidConfig(
                "exploration must be finite and >= 0".into(),
            ));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(SearchError::InvalidConfig(
                "decay must be in (0, 1]".into(),
            ));
        }
        if let Some(alpha) = self.dirichlet_const {
            if !(alpha.is_finite() && alpha > 0.0) {
                return Err(SearchError::InvalidConfig(
                    "dirichlet_const must be > 0".into(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.dirichlet_weight) {
            return Err(SearchError::InvalidConfig(
                "dirichlet_weight must be in [0, 1]".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(SearchError::InvalidConfig("max_depth must be >= 1".into()));
        }
        if self.search_threads == 0 {
            return Err(SearchError::InvalidConfig(
                "search_threads must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MctsConfig::default();
        assert_eq!(config.max_steps, 1600);
        assert!((config.exploration - 1.0).abs() < 1e-6);
        assert!((config.decay - 0.95).abs() < 1e-6);
        assert!((config.dirichlet_const.unwrap() - 1.0 / 12.0).abs() < 1e-6);
        assert_eq!(config.max_depth, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MctsConfig::default()
            .with_max_steps(100)
            .with_decay(0.9)
            .with_search_threads(4);

        assert_eq!(config.max_steps, 100);
        assert!((config.decay - 0.9).abs() < 1e-6);
        assert_eq!(config.search_threads, 4);
    }

    #[test]
    fn test_evaluation_config_has_no_noise() {
        assert!(MctsConfig::for_evaluation().dirichlet_const.is_none());
        assert!(MctsConfig::for_testing().dirichlet_const.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MctsConfig::default().with_max_steps(0).validate().is_err());
        assert!(MctsConfig::default().with_decay(0.0).validate().is_err());
        assert!(MctsConfig::default().with_decay(1.5).validate().is_err());
        assert!(MctsConfig::default()
            .with_dirichlet(Some(-1.0))
            .validate()
            .is_err());
        assert!(MctsConfig::default().with_max_depth(0).validate().is_err());
        assert!(MctsConfig::default()
            .with_search_threads(0)
            .validate()
            .is_err());
        assert!(MctsConfig::default().with_decay(1.0).validate().is_ok());
    }
}
