//! Consistency checks and derived settings.

use crate::CentralConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

impl CentralConfig {
    /// Reject settings no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.common.version.trim().is_empty() {
            return Err(invalid("common.version", "must not be empty"));
        }
        if self.model.history == 0 {
            return Err(invalid("model.history", "must be at least 1"));
        }
        if self.model.use_cache && self.model.max_cache_size == 0 {
            return Err(invalid(
                "model.max_cache_size",
                "must be positive when use_cache is set",
            ));
        }

        let ratio = self.training.training_sample_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(invalid(
                "training.training_sample_ratio",
                format!("{ratio} is outside (0, 1]"),
            ));
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate <= 1.0) {
            return Err(invalid(
                "training.learning_rate",
                format!("{} is outside (0, 1]", self.training.learning_rate),
            ));
        }

        let sp = &self.self_play;
        if sp.batch_size == 0 {
            return Err(invalid("self_play.batch_size", "must be positive"));
        }
        if !(0.0..=1.0).contains(&sp.win_rate_target) {
            return Err(invalid(
                "self_play.win_rate_target",
                format!("{} is outside [0, 1]", sp.win_rate_target),
            ));
        }
        if sp.starting_distance < sp.min_distance {
            return Err(invalid(
                "self_play.starting_distance",
                format!(
                    "{} is below min_distance {}",
                    sp.starting_distance, sp.min_distance
                ),
            ));
        }

        if self.concurrency.search_threads == 0 {
            return Err(invalid("concurrency.search_threads", "must be positive"));
        }

        let m = &self.mcts;
        if m.max_steps == 0 {
            return Err(invalid("mcts.max_steps", "must be positive"));
        }
        if !(m.decay > 0.0 && m.decay <= 1.0) {
            return Err(invalid("mcts.decay", format!("{} is outside (0, 1]", m.decay)));
        }
        if !(m.exploration >= 0.0) {
            return Err(invalid("mcts.exploration", "must be non-negative"));
        }
        if !(m.dirichlet_const >= 0.0) {
            return Err(invalid("mcts.dirichlet_const", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&m.dirichlet_weight) {
            return Err(invalid(
                "mcts.dirichlet_weight",
                format!("{} is outside [0, 1]", m.dirichlet_weight),
            ));
        }
        if m.max_depth == 0 {
            return Err(invalid("mcts.max_depth", "must be positive"));
        }

        if self.persistence.results_dir.trim().is_empty() {
            return Err(invalid("persistence.results_dir", "must not be empty"));
        }
        Ok(())
    }

    /// The evaluation cache only applies when the oracle sees no history.
    pub fn cache_enabled(&self) -> bool {
        self.model.use_cache && self.model.history <= 1
    }

    /// The transposition table only applies when the oracle sees no history.
    pub fn transposition_table_enabled(&self) -> bool {
        self.mcts.use_transposition_table && self.model.history == 1
    }

    /// `min_game_length`, with 0 standing for `max(2, history)`.
    ///
    /// Only a floor on `move_budget`: it has no effect once
    /// `max_game_length` is at least as large.
    pub fn effective_min_game_length(&self) -> u32 {
        match self.self_play.min_game_length {
            0 => (self.model.history as u32).max(2),
            n => n,
        }
    }

    /// Moves allowed per game.
    pub fn move_budget(&self) -> u32 {
        self.self_play
            .max_game_length
            .max(self.effective_min_game_length())
            .max(self.model.history as u32)
    }

    /// Root noise alpha; 0 disables noise.
    pub fn dirichlet_alpha(&self) -> Option<f32> {
        (self.mcts.dirichlet_const > 0.0).then_some(self.mcts.dirichlet_const as f32)
    }

    /// Generations whose examples stay in the replay window.
    pub fn replay_window(&self) -> usize {
        (1.0 / self.training.training_sample_ratio).round().max(1.0) as usize
    }
}
