//! Prometheus metrics for the actor.
//!
//! Covers self-play throughput and solve rate, MCTS search effort, oracle
//! traffic through the evaluation pipeline, and the curriculum and
//! promotion state. The text exposition is written to `metrics.prom` in the
//! run directory after every generation.

use std::path::Path;
use std::sync::Once;

use lazy_static::lazy_static;
use mcts::{PipelineStats, SearchResult};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

use crate::evaluation::PromotionDecision;
use crate::self_play::GameOutcome;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== Game Counters ==========

    /// Self-play games played to completion
    pub static ref GAMES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_games_total", "Self-play games played to completion")
    ).unwrap();

    /// Completed games that reached the solved state
    pub static ref GAMES_SOLVED: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_games_solved_total", "Self-play games that reached the solved state")
    ).unwrap();

    /// Games discarded after an oracle failure
    pub static ref GAMES_FAILED: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_games_failed_total", "Self-play games discarded after an oracle failure")
    ).unwrap();

    // ========== Game Histograms ==========

    pub static ref GAME_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("cubezero_game_duration_seconds", "Time to play one game")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).unwrap();

    pub static ref GAME_MOVES: Histogram = Histogram::with_opts(
        HistogramOpts::new("cubezero_game_moves", "Moves played per game")
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0])
    ).unwrap();

    // ========== MCTS Metrics ==========

    pub static ref MCTS_SEARCHES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_mcts_searches_total", "MCTS searches performed")
    ).unwrap();

    /// Searches that stopped early on a one-move solve
    pub static ref MCTS_PROVEN_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_mcts_proven_total", "Searches that found a one-move solve")
    ).unwrap();

    pub static ref MCTS_SEARCH_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("cubezero_mcts_search_seconds", "Wall time per search")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).unwrap();

    pub static ref MCTS_SIMULATIONS_PER_SEARCH: Histogram = Histogram::with_opts(
        HistogramOpts::new("cubezero_mcts_simulations_per_search", "Simulations per search")
            .buckets(vec![1.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0])
    ).unwrap();

    pub static ref MCTS_TREE_NODES: Histogram = Histogram::with_opts(
        HistogramOpts::new("cubezero_mcts_tree_nodes", "Nodes allocated per search")
            .buckets(vec![10.0, 100.0, 500.0, 1000.0, 2000.0, 5000.0])
    ).unwrap();

    // ========== Oracle Metrics ==========

    /// Mean oracle batch size of the champion pipeline
    pub static ref ORACLE_MEAN_BATCH: Gauge = Gauge::with_opts(
        Opts::new("cubezero_oracle_mean_batch_size", "Mean oracle batch size of the champion pipeline")
    ).unwrap();

    pub static ref CACHE_HIT_RATE: Gauge = Gauge::with_opts(
        Opts::new("cubezero_cache_hit_rate", "Evaluation cache hit rate of the champion pipeline")
    ).unwrap();

    pub static ref CACHE_ENTRIES: IntGauge = IntGauge::with_opts(
        Opts::new("cubezero_cache_entries", "Entries in the champion's evaluation cache")
    ).unwrap();

    // ========== Curriculum and Model Metrics ==========

    pub static ref SCRAMBLE_DISTANCE: IntGauge = IntGauge::with_opts(
        Opts::new("cubezero_scramble_distance", "Current curriculum scramble distance")
    ).unwrap();

    pub static ref WIN_RATE: Gauge = Gauge::with_opts(
        Opts::new("cubezero_self_play_win_rate", "Solve rate of the last self-play generation")
    ).unwrap();

    pub static ref CHAMPION_VERSION: IntGauge = IntGauge::with_opts(
        Opts::new("cubezero_champion_version", "Version of the current champion")
    ).unwrap();

    pub static ref GENERATIONS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_generations_total", "Generations completed")
    ).unwrap();

    pub static ref PROMOTIONS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("cubezero_promotions_total", "Challengers promoted to champion")
    ).unwrap();

    /// Challenger wins minus losses in the last evaluation
    pub static ref EVALUATION_MARGIN: IntGauge = IntGauge::with_opts(
        Opts::new("cubezero_evaluation_margin", "Challenger wins minus losses in the last evaluation")
    ).unwrap();

    // ========== Info Metrics ==========

    pub static ref RUN_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cubezero_run_info", "Run metadata"),
        &["puzzle", "version"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the registry. Safe to call multiple times.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(GAMES_TOTAL.clone()),
            Box::new(GAMES_SOLVED.clone()),
            Box::new(GAMES_FAILED.clone()),
            Box::new(GAME_DURATION.clone()),
            Box::new(GAME_MOVES.clone()),
            Box::new(MCTS_SEARCHES_TOTAL.clone()),
            Box::new(MCTS_PROVEN_TOTAL.clone()),
            Box::new(MCTS_SEARCH_SECONDS.clone()),
            Box::new(MCTS_SIMULATIONS_PER_SEARCH.clone()),
            Box::new(MCTS_TREE_NODES.clone()),
            Box::new(ORACLE_MEAN_BATCH.clone()),
            Box::new(CACHE_HIT_RATE.clone()),
            Box::new(CACHE_ENTRIES.clone()),
            Box::new(SCRAMBLE_DISTANCE.clone()),
            Box::new(WIN_RATE.clone()),
            Box::new(CHAMPION_VERSION.clone()),
            Box::new(GENERATIONS_TOTAL.clone()),
            Box::new(PROMOTIONS_TOTAL.clone()),
            Box::new(EVALUATION_MARGIN.clone()),
            Box::new(RUN_INFO.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Set run info labels (call once at startup after initializing)
pub fn set_run_info(puzzle: &str, version: &str) {
    RUN_INFO.with_label_values(&[puzzle, version]).set(1);
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write the text exposition next to the run's other records.
pub fn write_metrics(path: &Path) {
    if let Err(e) = std::fs::write(path, encode_metrics()) {
        warn!("Failed to write metrics to {}: {}", path.display(), e);
    }
}

pub fn record_search(result: &SearchResult) {
    MCTS_SEARCHES_TOTAL.inc();
    if result.proven {
        MCTS_PROVEN_TOTAL.inc();
    }
    MCTS_SEARCH_SECONDS.observe(result.stats.elapsed_us as f64 / 1e6);
    MCTS_SIMULATIONS_PER_SEARCH.observe(result.simulations as f64);
    MCTS_TREE_NODES.observe(result.stats.nodes as f64);
}

pub fn record_game(outcome: &GameOutcome, duration_secs: f64) {
    GAMES_TOTAL.inc();
    if outcome.solved {
        GAMES_SOLVED.inc();
    }
    GAME_MOVES.observe(outcome.moves as f64);
    GAME_DURATION.observe(duration_secs);
}

pub fn record_pipeline(stats: &PipelineStats) {
    if stats.batches.batches > 0 {
        ORACLE_MEAN_BATCH.set(stats.batches.items as f64 / stats.batches.batches as f64);
    }
    let lookups = stats.cache.hits + stats.cache.misses;
    if lookups > 0 {
        CACHE_HIT_RATE.set(stats.cache.hits as f64 / lookups as f64);
    }
    CACHE_ENTRIES.set(stats.cache.len as i64);
}

pub fn record_generation(distance: u32, win_rate: Option<f64>, champion_version: u32) {
    GENERATIONS_TOTAL.inc();
    SCRAMBLE_DISTANCE.set(distance as i64);
    if let Some(rate) = win_rate {
        WIN_RATE.set(rate);
    }
    CHAMPION_VERSION.set(champion_version as i64);
}

pub fn record_promotion(decision: &PromotionDecision) {
    EVALUATION_MARGIN.set(decision.wins as i64 - decision.losses as i64);
    if decision.promoted {
        PROMOTIONS_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_encode_metrics() {
        init_metrics();
        GAMES_TOTAL.inc();
        let output = encode_metrics();
        assert!(output.contains("cubezero_games_total"));
        assert!(output.contains("cubezero_mcts_searches_total"));
    }

    #[test]
    fn test_record_game_counts_solves() {
        let solved_before = GAMES_SOLVED.get();
        let total_before = GAMES_TOTAL.get();
        record_game(
            &GameOutcome {
                solved: true,
                moves: 3,
            },
            0.01,
        );
        record_game(
            &GameOutcome {
                solved: false,
                moves: 9,
            },
            0.02,
        );
        assert!(GAMES_TOTAL.get() >= total_before + 2);
        assert!(GAMES_SOLVED.get() > solved_before);
    }

    #[test]
    fn test_write_metrics() {
        init_metrics();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        record_generation(4, Some(0.5), 2);
        write_metrics(&path);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("cubezero_scramble_distance"));
    }
}
