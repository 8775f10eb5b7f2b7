//! Tests for the configuration module.

use super::*;
use std::io::Write;

#[test]
fn test_default_config() {
    let config = CentralConfig::default();
    assert_eq!(config.common.log_level, "info");
    assert_eq!(config.common.seed, 42);
    assert_eq!(config.common.version, "dev");
    assert!(config.model.use_cache);
    assert_eq!(config.model.max_cache_size, 10_000);
    assert_eq!(config.model.history, 1);
    assert!(config.model.rotationally_randomize);
    assert_eq!(config.persistence.results_dir, "./results");
    assert!(config.persistence.prev_versions.is_empty());
}

#[test]
fn test_training_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.training.generations, 100);
    assert!(config.training.validate_training_data);
    assert!(config.training.augment_training_data);
    assert!((config.training.training_sample_ratio - 0.125).abs() < f64::EPSILON);
    assert!((config.training.learning_rate - 0.001).abs() < f64::EPSILON);
}

#[test]
fn test_self_play_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.self_play.games_per_generation, 512);
    assert_eq!(config.self_play.batch_size, 32);
    assert_eq!(config.self_play.starting_distance, 1);
    assert_eq!(config.self_play.min_distance, 1);
    assert_eq!(config.self_play.distance_step, 1);
    assert!((config.self_play.win_rate_target - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.self_play.min_game_length, 0);
    assert_eq!(config.self_play.max_game_length, 100);
}

#[test]
fn test_evaluation_and_concurrency_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.evaluation.games_per_evaluation, 128);
    assert_eq!(config.evaluation.win_margin_to_become_best_model, 6);
    assert!(config.concurrency.multithreaded);
    assert_eq!(config.concurrency.search_threads, 8);
    assert_eq!(config.concurrency.batch_wait_us, 250);
}

#[test]
fn test_mcts_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.mcts.max_steps, 1600);
    assert!((config.mcts.exploration - 1.0).abs() < f64::EPSILON);
    assert!((config.mcts.decay - 0.95).abs() < f64::EPSILON);
    assert!((config.mcts.dirichlet_const - 1.0 / 12.0).abs() < 1e-9);
    assert!((config.mcts.dirichlet_weight - 0.25).abs() < f64::EPSILON);
    assert_eq!(config.mcts.max_depth, 900);
    assert!(config.mcts.use_transposition_table);
}

#[test]
fn test_defaults_validate() {
    assert!(CentralConfig::default().validate().is_ok());
}

#[test]
fn test_cubezero_env_overrides() {
    std::env::set_var("CUBEZERO_COMMON_VERSION", "env-run");
    std::env::set_var("CUBEZERO_MCTS_MAX_STEPS", "77");
    std::env::set_var("CUBEZERO_EVALUATION_WIN_MARGIN_TO_BECOME_BEST_MODEL", "-2");
    std::env::set_var("CUBEZERO_PERSISTENCE_PREV_VERSIONS", "run-a, run-b,");

    let config = apply_env_overrides(CentralConfig::default());
    assert_eq!(config.common.version, "env-run");
    assert_eq!(config.mcts.max_steps, 77);
    assert_eq!(config.evaluation.win_margin_to_become_best_model, -2);
    assert_eq!(config.persistence.prev_versions, vec!["run-a", "run-b"]);

    std::env::remove_var("CUBEZERO_COMMON_VERSION");
    std::env::remove_var("CUBEZERO_MCTS_MAX_STEPS");
    std::env::remove_var("CUBEZERO_EVALUATION_WIN_MARGIN_TO_BECOME_BEST_MODEL");
    std::env::remove_var("CUBEZERO_PERSISTENCE_PREV_VERSIONS");
}

#[test]
fn test_unparseable_env_override_is_ignored() {
    std::env::set_var("CUBEZERO_CONCURRENCY_SEARCH_THREADS", "many");
    let config = apply_env_overrides(CentralConfig::default());
    assert_eq!(config.concurrency.search_threads, 8);
    std::env::remove_var("CUBEZERO_CONCURRENCY_SEARCH_THREADS");
}

#[test]
fn test_parse_config_toml() {
    let toml_content = r#"
[common]
seed = 7
version = "exp-1"

[model]
history = 3
use_cache = true

[self_play]
games_per_generation = 64
min_game_length = 5

[mcts]
max_steps = 200
dirichlet_const = 0.0
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.common.seed, 7);
    assert_eq!(config.common.version, "exp-1");
    assert_eq!(config.model.history, 3);
    assert_eq!(config.self_play.games_per_generation, 64);
    assert_eq!(config.self_play.min_game_length, 5);
    assert_eq!(config.mcts.max_steps, 200);
    assert_eq!(config.dirichlet_alpha(), None);
    // History > 1 disables both state-keyed structures.
    assert!(!config.cache_enabled());
    assert!(!config.transposition_table_enabled());
}

#[test]
fn test_partial_config() {
    let toml_content = r#"
[common]
version = "partial"
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.common.version, "partial");
    assert_eq!(config.common.seed, 42); // Default
    assert_eq!(config.mcts.max_steps, 1600); // Default
    assert_eq!(config.evaluation.games_per_evaluation, 128); // Default
}

#[test]
fn test_try_load_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[training]\ngenerations = 3").unwrap();
    let config = try_load_from_path(file.path()).unwrap();
    assert_eq!(config.training.generations, 3);
}

#[test]
fn test_try_load_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[training\ngenerations = ").unwrap();
    let err = try_load_from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    // The lenient loader falls back to defaults instead.
    let config = load_from_path(file.path());
    assert_eq!(config.training.generations, 100);
}

#[test]
fn test_try_load_missing_file() {
    let err = try_load_from_path(std::path::Path::new("/nonexistent/cubezero.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_min_game_length_and_budget() {
    let mut config = CentralConfig::default();
    assert_eq!(config.effective_min_game_length(), 2);
    assert_eq!(config.move_budget(), 100);

    config.model.history = 4;
    assert_eq!(config.effective_min_game_length(), 4);

    config.self_play.max_game_length = 1;
    config.self_play.min_game_length = 0;
    assert_eq!(config.move_budget(), 4);

    config.self_play.min_game_length = 9;
    assert_eq!(config.move_budget(), 9);

    // Below max_game_length the floor does nothing.
    config.self_play.max_game_length = 50;
    assert_eq!(config.move_budget(), 50);
}

#[test]
fn test_replay_window() {
    let mut config = CentralConfig::default();
    assert_eq!(config.replay_window(), 8);
    config.training.training_sample_ratio = 0.3;
    assert_eq!(config.replay_window(), 3);
    config.training.training_sample_ratio = 1.0;
    assert_eq!(config.replay_window(), 1);
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = CentralConfig::default();
    config.mcts.decay = 0.0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { key: "mcts.decay", .. })
    ));

    let mut config = CentralConfig::default();
    config.training.training_sample_ratio = 1.5;
    assert!(config.validate().is_err());

    let mut config = CentralConfig::default();
    config.model.history = 0;
    assert!(config.validate().is_err());

    let mut config = CentralConfig::default();
    config.self_play.starting_distance = 0;
    config.self_play.min_distance = 2;
    assert!(config.validate().is_err());

    let mut config = CentralConfig::default();
    config.concurrency.search_threads = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serializes_back_to_toml() {
    let config = CentralConfig::default();
    let text = toml::to_string(&config).unwrap();
    let parsed: CentralConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed.mcts.max_steps, config.mcts.max_steps);
    assert_eq!(parsed.common.version, config.common.version);
}
