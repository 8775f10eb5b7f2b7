//! Default configuration values loaded from config.defaults.toml.
//!
//! This module loads defaults from the shared TOML file at compile time, so
//! the documented defaults and the compiled ones cannot drift apart.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    model: ModelDefaults,
    training: TrainingDefaults,
    self_play: SelfPlayDefaults,
    evaluation: EvaluationDefaults,
    concurrency: ConcurrencyDefaults,
    mcts: MctsDefaults,
    persistence: PersistenceDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    log_level: String,
    seed: u64,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ModelDefaults {
    use_cache: bool,
    max_cache_size: usize,
    history: usize,
    rotationally_randomize: bool,
}

#[derive(Debug, Deserialize)]
struct TrainingDefaults {
    generations: u32,
    validate_training_data: bool,
    augment_training_data: bool,
    training_sample_ratio: f64,
    learning_rate: f64,
}

#[derive(Debug, Deserialize)]
struct SelfPlayDefaults {
    games_per_generation: u32,
    batch_size: usize,
    starting_distance: u32,
    min_distance: u32,
    distance_step: u32,
    win_rate_target: f64,
    min_game_length: u32,
    max_game_length: u32,
}

#[derive(Debug, Deserialize)]
struct EvaluationDefaults {
    games_per_evaluation: u32,
    win_margin_to_become_best_model: i64,
}

#[derive(Debug, Deserialize)]
struct ConcurrencyDefaults {
    multithreaded: bool,
    search_threads: usize,
    batch_wait_us: u64,
}

#[derive(Debug, Deserialize)]
struct MctsDefaults {
    max_steps: u32,
    exploration: f64,
    decay: f64,
    dirichlet_const: f64,
    dirichlet_weight: f64,
    max_depth: u32,
    use_transposition_table: bool,
}

#[derive(Debug, Deserialize)]
struct PersistenceDefaults {
    results_dir: String,
    prev_versions: Vec<String>,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}
pub fn seed() -> u64 {
    DEFAULTS.common.seed
}
pub fn version() -> &'static str {
    &DEFAULTS.common.version
}

// Model
pub fn use_cache() -> bool {
    DEFAULTS.model.use_cache
}
pub fn max_cache_size() -> usize {
    DEFAULTS.model.max_cache_size
}
pub fn history() -> usize {
    DEFAULTS.model.history
}
pub fn rotationally_randomize() -> bool {
    DEFAULTS.model.rotationally_randomize
}

// Training
pub fn generations() -> u32 {
    DEFAULTS.training.generations
}
pub fn validate_training_data() -> bool {
    DEFAULTS.training.validate_training_data
}
pub fn augment_training_data() -> bool {
    DEFAULTS.training.augment_training_data
}
pub fn training_sample_ratio() -> f64 {
    DEFAULTS.training.training_sample_ratio
}
pub fn learning_rate() -> f64 {
    DEFAULTS.training.learning_rate
}

// Self-play
pub fn games_per_generation() -> u32 {
    DEFAULTS.self_play.games_per_generation
}
pub fn batch_size() -> usize {
    DEFAULTS.self_play.batch_size
}
pub fn starting_distance() -> u32 {
    DEFAULTS.self_play.starting_distance
}
pub fn min_distance() -> u32 {
    DEFAULTS.self_play.min_distance
}
pub fn distance_step() -> u32 {
    DEFAULTS.self_play.distance_step
}
pub fn win_rate_target() -> f64 {
    DEFAULTS.self_play.win_rate_target
}
pub fn min_game_length() -> u32 {
    DEFAULTS.self_play.min_game_length
}
pub fn max_game_length() -> u32 {
    DEFAULTS.self_play.max_game_length
}

// Evaluation
pub fn games_per_evaluation() -> u32 {
    DEFAULTS.evaluation.games_per_evaluation
}
pub fn win_margin_to_become_best_model() -> i64 {
    DEFAULTS.evaluation.win_margin_to_become_best_model
}

// Concurrency
pub fn multithreaded() -> bool {
    DEFAULTS.concurrency.multithreaded
}
pub fn search_threads() -> usize {
    DEFAULTS.concurrency.search_threads
}
pub fn batch_wait_us() -> u64 {
    DEFAULTS.concurrency.batch_wait_us
}

// MCTS
pub fn max_steps() -> u32 {
    DEFAULTS.mcts.max_steps
}
pub fn exploration() -> f64 {
    DEFAULTS.mcts.exploration
}
pub fn decay() -> f64 {
    DEFAULTS.mcts.decay
}
pub fn dirichlet_const() -> f64 {
    DEFAULTS.mcts.dirichlet_const
}
pub fn dirichlet_weight() -> f64 {
    DEFAULTS.mcts.dirichlet_weight
}
pub fn max_depth() -> u32 {
    DEFAULTS.mcts.max_depth
}
pub fn use_transposition_table() -> bool {
    DEFAULTS.mcts.use_transposition_table
}

// Persistence
pub fn results_dir() -> &'static str {
    &DEFAULTS.persistence.results_dir
}
pub fn prev_versions() -> &'static [String] {
    &DEFAULTS.persistence.prev_versions
}
