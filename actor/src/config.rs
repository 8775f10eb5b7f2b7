//! Command line for the actor binary.
//!
//! Configuration is loaded from config.toml with environment variable
//! overrides. CLI arguments take highest priority, followed by env vars,
//! then config.toml, then the built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine_config::{load_config, try_load_from_path, CentralConfig};
use mcts::{MctsConfig, PipelineConfig};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "actor")]
#[command(about = "Cubezero actor - self-play, training and promotion loop")]
#[command(
    long_about = "Runs the Cubezero curriculum: scrambled self-play with MCTS, training on a
sliding window of recent games, and challenger/champion evaluation.

Configuration is loaded from config.toml (or CUBEZERO_CONFIG) with
CUBEZERO_<SECTION>_<KEY> environment overrides. CLI arguments take highest
priority."
)]
pub struct Config {
    /// Config file to load instead of the search path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of generations to run
    #[arg(long)]
    pub generations: Option<u32>,

    /// Seed for scrambles, search and sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run name; records go to <results_dir>/<version>
    #[arg(long)]
    pub version: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding one subdirectory per run
    #[arg(long)]
    pub results_dir: Option<String>,

    /// Previous runs to warm-start the replay window from, most recent first
    #[arg(long, value_delimiter = ',')]
    pub prev_versions: Option<Vec<String>>,

    /// Run without writing game and example logs
    #[arg(long)]
    pub no_record: bool,
}

impl Config {
    /// Load the layered configuration and apply CLI overrides.
    pub fn resolve(&self) -> Result<CentralConfig> {
        let base = match &self.config {
            Some(path) => try_load_from_path(path)
                .with_context(|| format!("Failed to load --config {}", path.display()))?,
            None => load_config(),
        };
        let config = self.apply(base);

        config.validate()?;
        if config.common.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                config.common.log_level
            ));
        }
        Ok(config)
    }

    fn apply(&self, mut config: CentralConfig) -> CentralConfig {
        if let Some(generations) = self.generations {
            config.training.generations = generations;
        }
        if let Some(seed) = self.seed {
            config.common.seed = seed;
        }
        if let Some(version) = &self.version {
            config.common.version = version.clone();
        }
        if let Some(level) = &self.log_level {
            config.common.log_level = level.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.persistence.results_dir = dir.clone();
        }
        if let Some(prev) = &self.prev_versions {
            config.persistence.prev_versions = prev.clone();
        }
        config
    }
}

/// Search settings for self-play, with root noise.
pub fn training_search(config: &CentralConfig) -> MctsConfig {
    search_config(config).with_dirichlet(config.dirichlet_alpha())
}

/// Search settings for evaluation games, without root noise.
pub fn evaluation_search(config: &CentralConfig) -> MctsConfig {
    search_config(config).with_dirichlet(None)
}

fn search_config(config: &CentralConfig) -> MctsConfig {
    let m = &config.mcts;
    let threads = if config.concurrency.multithreaded {
        config.concurrency.search_threads
    } else {
        1
    };
    MctsConfig {
        dirichlet_weight: m.dirichlet_weight as f32,
        ..MctsConfig::default()
    }
    .with_max_steps(m.max_steps)
    .with_exploration(m.exploration as f32)
    .with_decay(m.decay as f32)
    .with_max_depth(m.max_depth)
    .with_transposition_table(config.transposition_table_enabled())
    .with_search_threads(threads)
}

/// Pipeline settings for a model snapshot.
pub fn pipeline_config(config: &CentralConfig) -> PipelineConfig {
    PipelineConfig {
        use_cache: config.cache_enabled(),
        max_cache_size: config.model.max_cache_size,
        history: config.model.history,
        rotationally_randomize: config.model.rotationally_randomize,
        multithreaded: config.concurrency.multithreaded,
        batch_size: config.self_play.batch_size,
        batch_wait: Duration::from_micros(config.concurrency.batch_wait_us),
    }
}
