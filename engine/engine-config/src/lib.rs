//! Centralized configuration loading from config.toml.
//!
//! This crate provides the configuration structs and loading logic used by
//! the actor binary and its tests.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`CUBEZERO_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults (`config.defaults.toml`, embedded at compile time)
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! CUBEZERO_<SECTION>_<KEY>=value
//!
//! Examples:
//!     CUBEZERO_COMMON_SEED=7
//!     CUBEZERO_MODEL_HISTORY=2
//!     CUBEZERO_SELF_PLAY_GAMES_PER_GENERATION=64
//!     CUBEZERO_MCTS_MAX_STEPS=400
//!     CUBEZERO_PERSISTENCE_PREV_VERSIONS=run-a,run-b
//! ```

mod defaults;
mod loader;
mod structs;
mod validate;

pub use defaults::*;
pub use loader::{
    apply_env_overrides, load_config, load_from_path, try_load_from_path, CONFIG_SEARCH_PATHS,
};
pub use structs::*;
pub use validate::ConfigError;

#[cfg(test)]
mod tests;
