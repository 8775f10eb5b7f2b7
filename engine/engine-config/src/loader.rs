//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::{CentralConfig, ConfigError};
use std::path::Path;
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",      // Current directory
    "../config.toml",   // Parent directory (when running from subdirectory)
    "/app/config.toml", // Docker container
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by CUBEZERO_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. Docker container path (/app/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    // Check for explicit config path
    if let Ok(path) = std::env::var("CUBEZERO_CONFIG") {
        let path = Path::new(&path);
        if path.exists() {
            info!("Loading config from CUBEZERO_CONFIG: {}", path.display());
            return load_from_path(path);
        }
        warn!(
            "CUBEZERO_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    // Search default locations
    for path_str in CONFIG_SEARCH_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(path);
        }
    }

    // Fall back to defaults
    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path, falling back to defaults when
/// the file cannot be read or parsed.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match try_load_from_path(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Load configuration from a path the user asked for explicitly.
pub fn try_load_from_path(path: &Path) -> Result<CentralConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(apply_env_overrides(config))
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (u32, f64, bool, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
    // Comma-separated list of strings
    ($config:expr, $section:ident . $field:ident, $key:expr, list) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: CUBEZERO_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.log_level, "CUBEZERO_COMMON_LOG_LEVEL");
    env_override!(config, common.seed, "CUBEZERO_COMMON_SEED", parse);
    env_override!(config, common.version, "CUBEZERO_COMMON_VERSION");

    // Model
    env_override!(config, model.use_cache, "CUBEZERO_MODEL_USE_CACHE", parse);
    env_override!(
        config,
        model.max_cache_size,
        "CUBEZERO_MODEL_MAX_CACHE_SIZE",
        parse
    );
    env_override!(config, model.history, "CUBEZERO_MODEL_HISTORY", parse);
    env_override!(
        config,
        model.rotationally_randomize,
        "CUBEZERO_MODEL_ROTATIONALLY_RANDOMIZE",
        parse
    );

    // Training
    env_override!(
        config,
        training.generations,
        "CUBEZERO_TRAINING_GENERATIONS",
        parse
    );
    env_override!(
        config,
        training.validate_training_data,
        "CUBEZERO_TRAINING_VALIDATE_TRAINING_DATA",
        parse
    );
    env_override!(
        config,
        training.augment_training_data,
        "CUBEZERO_TRAINING_AUGMENT_TRAINING_DATA",
        parse
    );
    env_override!(
        config,
        training.training_sample_ratio,
        "CUBEZERO_TRAINING_TRAINING_SAMPLE_RATIO",
        parse
    );
    env_override!(
        config,
        training.learning_rate,
        "CUBEZERO_TRAINING_LEARNING_RATE",
        parse
    );

    // Self-play
    env_override!(
        config,
        self_play.games_per_generation,
        "CUBEZERO_SELF_PLAY_GAMES_PER_GENERATION",
        parse
    );
    env_override!(
        config,
        self_play.batch_size,
        "CUBEZERO_SELF_PLAY_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        self_play.starting_distance,
        "CUBEZERO_SELF_PLAY_STARTING_DISTANCE",
        parse
    );
    env_override!(
        config,
        self_play.min_distance,
        "CUBEZERO_SELF_PLAY_MIN_DISTANCE",
        parse
    );
    env_override!(
        config,
        self_play.distance_step,
        "CUBEZERO_SELF_PLAY_DISTANCE_STEP",
        parse
    );
    env_override!(
        config,
        self_play.win_rate_target,
        "CUBEZERO_SELF_PLAY_WIN_RATE_TARGET",
        parse
    );
    env_override!(
        config,
        self_play.min_game_length,
        "CUBEZERO_SELF_PLAY_MIN_GAME_LENGTH",
        parse
    );
    env_override!(
        config,
        self_play.max_game_length,
        "CUBEZERO_SELF_PLAY_MAX_GAME_LENGTH",
        parse
    );

    // Evaluation
    env_override!(
        config,
        evaluation.games_per_evaluation,
        "CUBEZERO_EVALUATION_GAMES_PER_EVALUATION",
        parse
    );
    env_override!(
        config,
        evaluation.win_margin_to_become_best_model,
        "CUBEZERO_EVALUATION_WIN_MARGIN_TO_BECOME_BEST_MODEL",
        parse
    );

    // Concurrency
    env_override!(
        config,
        concurrency.multithreaded,
        "CUBEZERO_CONCURRENCY_MULTITHREADED",
        parse
    );
    env_override!(
        config,
        concurrency.search_threads,
        "CUBEZERO_CONCURRENCY_SEARCH_THREADS",
        parse
    );
    env_override!(
        config,
        concurrency.batch_wait_us,
        "CUBEZERO_CONCURRENCY_BATCH_WAIT_US",
        parse
    );

    // MCTS
    env_override!(config, mcts.max_steps, "CUBEZERO_MCTS_MAX_STEPS", parse);
    env_override!(config, mcts.exploration, "CUBEZERO_MCTS_EXPLORATION", parse);
    env_override!(config, mcts.decay, "CUBEZERO_MCTS_DECAY", parse);
    env_override!(
        config,
        mcts.dirichlet_const,
        "CUBEZERO_MCTS_DIRICHLET_CONST",
        parse
    );
    env_override!(
        config,
        mcts.dirichlet_weight,
        "CUBEZERO_MCTS_DIRICHLET_WEIGHT",
        parse
    );
    env_override!(config, mcts.max_depth, "CUBEZERO_MCTS_MAX_DEPTH", parse);
    env_override!(
        config,
        mcts.use_transposition_table,
        "CUBEZERO_MCTS_USE_TRANSPOSITION_TABLE",
        parse
    );

    // Persistence
    env_override!(
        config,
        persistence.results_dir,
        "CUBEZERO_PERSISTENCE_RESULTS_DIR"
    );
    env_override!(
        config,
        persistence.prev_versions,
        "CUBEZERO_PERSISTENCE_PREV_VERSIONS",
        list
    );

    config
}
