//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default values.

use crate::defaults;
use serde::{Deserialize, Serialize};

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// These call the accessor functions from defaults module
// ============================================================================

fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_seed() -> u64 {
    defaults::seed()
}
fn d_version() -> String {
    defaults::version().into()
}
fn d_use_cache() -> bool {
    defaults::use_cache()
}
fn d_max_cache_size() -> usize {
    defaults::max_cache_size()
}
fn d_history() -> usize {
    defaults::history()
}
fn d_rotationally_randomize() -> bool {
    defaults::rotationally_randomize()
}
fn d_generations() -> u32 {
    defaults::generations()
}
fn d_validate() -> bool {
    defaults::validate_training_data()
}
fn d_augment() -> bool {
    defaults::augment_training_data()
}
fn d_sample_ratio() -> f64 {
    defaults::training_sample_ratio()
}
fn d_lr() -> f64 {
    defaults::learning_rate()
}
fn d_games_per_generation() -> u32 {
    defaults::games_per_generation()
}
fn d_batch_size() -> usize {
    defaults::batch_size()
}
fn d_starting_distance() -> u32 {
    defaults::starting_distance()
}
fn d_min_distance() -> u32 {
    defaults::min_distance()
}
fn d_distance_step() -> u32 {
    defaults::distance_step()
}
fn d_win_rate_target() -> f64 {
    defaults::win_rate_target()
}
fn d_min_game_length() -> u32 {
    defaults::min_game_length()
}
fn d_max_game_length() -> u32 {
    defaults::max_game_length()
}
fn d_eval_games() -> u32 {
    defaults::games_per_evaluation()
}
fn d_win_margin() -> i64 {
    defaults::win_margin_to_become_best_model()
}
fn d_multithreaded() -> bool {
    defaults::multithreaded()
}
fn d_search_threads() -> usize {
    defaults::search_threads()
}
fn d_batch_wait_us() -> u64 {
    defaults::batch_wait_us()
}
fn d_max_steps() -> u32 {
    defaults::max_steps()
}
fn d_exploration() -> f64 {
    defaults::exploration()
}
fn d_decay() -> f64 {
    defaults::decay()
}
fn d_dirichlet_const() -> f64 {
    defaults::dirichlet_const()
}
fn d_dirichlet_weight() -> f64 {
    defaults::dirichlet_weight()
}
fn d_max_depth() -> u32 {
    defaults::max_depth()
}
fn d_use_tt() -> bool {
    defaults::use_transposition_table()
}
fn d_results_dir() -> String {
    defaults::results_dir().into()
}
fn d_prev_versions() -> Vec<String> {
    defaults::prev_versions().to_vec()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub self_play: SelfPlayConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub mcts: MctsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Settings shared by every component
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_log_level")]
    pub log_level: String,
    /// Master seed; every game derives its own seed from it.
    #[serde(default = "d_seed")]
    pub seed: u64,
    /// Run name; output goes to `results_dir/<version>/`.
    #[serde(default = "d_version")]
    pub version: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level().into(),
            seed: defaults::seed(),
            version: defaults::version().into(),
        }
    }
}

/// How the oracle is queried
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(default = "d_use_cache")]
    pub use_cache: bool,
    #[serde(default = "d_max_cache_size")]
    pub max_cache_size: usize,
    /// Number of states (current + previous) the oracle sees.
    #[serde(default = "d_history")]
    pub history: usize,
    #[serde(default = "d_rotationally_randomize")]
    pub rotationally_randomize: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            use_cache: defaults::use_cache(),
            max_cache_size: defaults::max_cache_size(),
            history: defaults::history(),
            rotationally_randomize: defaults::rotationally_randomize(),
        }
    }
}

/// Training data handling and trainer settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TrainingConfig {
    /// Generations to run (0 = until interrupted)
    #[serde(default = "d_generations")]
    pub generations: u32,
    #[serde(default = "d_validate")]
    pub validate_training_data: bool,
    #[serde(default = "d_augment")]
    pub augment_training_data: bool,
    /// Fraction of the replay window sampled per training round; its
    /// reciprocal is the window length in generations.
    #[serde(default = "d_sample_ratio")]
    pub training_sample_ratio: f64,
    #[serde(default = "d_lr")]
    pub learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            generations: defaults::generations(),
            validate_training_data: defaults::validate_training_data(),
            augment_training_data: defaults::augment_training_data(),
            training_sample_ratio: defaults::training_sample_ratio(),
            learning_rate: defaults::learning_rate(),
        }
    }
}

/// Self-play curriculum
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelfPlayConfig {
    #[serde(default = "d_games_per_generation")]
    pub games_per_generation: u32,
    /// Oracle batch size for the evaluation scheduler
    #[serde(default = "d_batch_size")]
    pub batch_size: usize,
    #[serde(default = "d_starting_distance")]
    pub starting_distance: u32,
    #[serde(default = "d_min_distance")]
    pub min_distance: u32,
    #[serde(default = "d_distance_step")]
    pub distance_step: u32,
    #[serde(default = "d_win_rate_target")]
    pub win_rate_target: f64,
    /// 0 means `max(2, history)`
    #[serde(default = "d_min_game_length")]
    pub min_game_length: u32,
    #[serde(default = "d_max_game_length")]
    pub max_game_length: u32,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            games_per_generation: defaults::games_per_generation(),
            batch_size: defaults::batch_size(),
            starting_distance: defaults::starting_distance(),
            min_distance: defaults::min_distance(),
            distance_step: defaults::distance_step(),
            win_rate_target: defaults::win_rate_target(),
            min_game_length: defaults::min_game_length(),
            max_game_length: defaults::max_game_length(),
        }
    }
}

/// Challenger vs champion evaluation
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EvaluationConfig {
    #[serde(default = "d_eval_games")]
    pub games_per_evaluation: u32,
    #[serde(default = "d_win_margin")]
    pub win_margin_to_become_best_model: i64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            games_per_evaluation: defaults::games_per_evaluation(),
            win_margin_to_become_best_model: defaults::win_margin_to_become_best_model(),
        }
    }
}

/// Search threads and oracle batching
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConcurrencyConfig {
    #[serde(default = "d_multithreaded")]
    pub multithreaded: bool,
    #[serde(default = "d_search_threads")]
    pub search_threads: usize,
    /// How long the scheduler waits to fill a batch, in microseconds
    #[serde(default = "d_batch_wait_us")]
    pub batch_wait_us: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            multithreaded: defaults::multithreaded(),
            search_threads: defaults::search_threads(),
            batch_wait_us: defaults::batch_wait_us(),
        }
    }
}

/// MCTS (Monte Carlo Tree Search) configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MctsConfig {
    #[serde(default = "d_max_steps")]
    pub max_steps: u32,
    #[serde(default = "d_exploration")]
    pub exploration: f64,
    #[serde(default = "d_decay")]
    pub decay: f64,
    /// Dirichlet alpha for root noise; 0 disables noise
    #[serde(default = "d_dirichlet_const")]
    pub dirichlet_const: f64,
    #[serde(default = "d_dirichlet_weight")]
    pub dirichlet_weight: f64,
    #[serde(default = "d_max_depth")]
    pub max_depth: u32,
    #[serde(default = "d_use_tt")]
    pub use_transposition_table: bool,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            max_steps: defaults::max_steps(),
            exploration: defaults::exploration(),
            decay: defaults::decay(),
            dirichlet_const: defaults::dirichlet_const(),
            dirichlet_weight: defaults::dirichlet_weight(),
            max_depth: defaults::max_depth(),
            use_transposition_table: defaults::use_transposition_table(),
        }
    }
}

/// Where results go and which earlier runs seed the replay window
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    #[serde(default = "d_results_dir")]
    pub results_dir: String,
    #[serde(default = "d_prev_versions")]
    pub prev_versions: Vec<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            results_dir: defaults::results_dir().into(),
            prev_versions: defaults::prev_versions().to_vec(),
        }
    }
}
