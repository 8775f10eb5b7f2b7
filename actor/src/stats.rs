//! Run statistics tracking and persistence.
//!
//! This module tracks:
//! - Game counts, solves and failures
//! - MCTS effort (searches, simulations, oracle traffic)
//! - Generations and promotions
//!
//! Stats are written to `stats.json` in the run directory for dashboards
//! and scripts to pick up.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

use crate::self_play::SearchTotals;

/// One line of `generations.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u32,
    pub champion_version: u32,
    pub distance: u32,
    pub next_distance: u32,
    pub games: u32,
    pub solved: u32,
    pub failed: u32,
    /// Solved fraction of completed games; absent when none completed.
    pub win_rate: Option<f64>,
    pub examples: usize,
    pub sampled: usize,
    pub challenger_version: Option<u32>,
    pub promoted: Option<bool>,
    pub elapsed_secs: f64,
}

/// Aggregated run statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct ActorStats {
    games_completed: AtomicU32,
    games_solved: AtomicU32,
    games_failed: AtomicU32,
    /// Moves across completed games
    total_moves: AtomicU64,
    searches: AtomicU64,
    simulations: AtomicU64,
    oracle_evals: AtomicU64,
    cache_hits: AtomicU64,
    /// Wall time spent inside searches (microseconds)
    search_us: AtomicU64,
    generations: AtomicU32,
    promotions: AtomicU32,
    start_time: Instant,
    stats_path: String,
    puzzle_id: String,
}

/// Serializable stats for JSON output.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActorStatsSnapshot {
    pub puzzle_id: String,
    pub games_completed: u32,
    pub games_solved: u32,
    pub games_failed: u32,
    pub solve_rate: f64,
    pub total_moves: u64,
    pub avg_game_length: f64,
    pub games_per_second: f64,
    pub searches: u64,
    pub simulations: u64,
    pub oracle_evals: u64,
    pub cache_hits: u64,
    pub avg_search_us: f64,
    pub generations: u32,
    pub promotions: u32,
    pub runtime_seconds: f64,
    pub timestamp: u64,
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

impl ActorStats {
    /// Create a tracker writing to `<run_dir>/stats.json`.
    pub fn new(run_dir: &str, puzzle_id: &str) -> Self {
        let stats_path = format!("{}/stats.json", run_dir);

        if let Err(e) = fs::create_dir_all(run_dir) {
            warn!("Failed to create run directory: {}", e);
        }

        Self {
            games_completed: AtomicU32::new(0),
            games_solved: AtomicU32::new(0),
            games_failed: AtomicU32::new(0),
            total_moves: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            simulations: AtomicU64::new(0),
            oracle_evals: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            search_us: AtomicU64::new(0),
            generations: AtomicU32::new(0),
            promotions: AtomicU32::new(0),
            start_time: Instant::now(),
            stats_path,
            puzzle_id: puzzle_id.to_string(),
        }
    }

    /// Record a completed self-play game.
    pub fn record_game(&self, moves: u32, solved: bool) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
        self.total_moves.fetch_add(moves as u64, Ordering::Relaxed);
        if solved {
            self.games_solved.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failures(&self, failed: u32) {
        self.games_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_searches(&self, totals: &SearchTotals) {
        self.searches.fetch_add(totals.searches, Ordering::Relaxed);
        self.simulations
            .fetch_add(totals.simulations, Ordering::Relaxed);
        self.oracle_evals
            .fetch_add(totals.oracle_evals, Ordering::Relaxed);
        self.cache_hits.fetch_add(totals.cache_hits, Ordering::Relaxed);
        self.search_us.fetch_add(totals.search_us, Ordering::Relaxed);
    }

    pub fn record_generation(&self, promoted: bool) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        if promoted {
            self.promotions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> ActorStatsSnapshot {
        let games = self.games_completed.load(Ordering::Relaxed);
        let solved = self.games_solved.load(Ordering::Relaxed);
        let moves = self.total_moves.load(Ordering::Relaxed);
        let searches = self.searches.load(Ordering::Relaxed);
        let search_us = self.search_us.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed().as_secs_f64();

        ActorStatsSnapshot {
            puzzle_id: self.puzzle_id.clone(),
            games_completed: games,
            games_solved: solved,
            games_failed: self.games_failed.load(Ordering::Relaxed),
            solve_rate: ratio(solved as f64, games as f64),
            total_moves: moves,
            avg_game_length: ratio(moves as f64, games as f64),
            games_per_second: ratio(games as f64, runtime),
            searches,
            simulations: self.simulations.load(Ordering::Relaxed),
            oracle_evals: self.oracle_evals.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            avg_search_us: ratio(search_us as f64, searches as f64),
            generations: self.generations.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            runtime_seconds: runtime,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write stats to JSON file (atomic write-then-rename).
    pub fn write_stats(&self) {
        let snapshot = self.snapshot();

        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize run stats: {}", e);
                return;
            }
        };

        let temp_path = format!("{}.tmp", self.stats_path);
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("Failed to write run stats: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to create temp stats file: {}", e);
                return;
            }
        }

        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("Failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        debug!("Wrote run stats to {}", self.stats_path);
    }

    pub fn stats_path(&self) -> &Path {
        Path::new(&self.stats_path)
    }
}
