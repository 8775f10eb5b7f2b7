//! Actor - Cubezero self-play, training and promotion loop
//!
//! A long-running process that:
//! 1. Plays scrambled self-play games with MCTS guided by the champion
//! 2. Trains a challenger on a sliding window of recent examples
//! 3. Promotes the challenger when it beats the champion by a margin
//! 4. Logs games, examples and decisions to `<results_dir>/<version>/`

use anyhow::{Context, Result};
use clap::Parser;
use engine_core::Puzzle;
use games_rotation::RotationPuzzle;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod actor;
mod champion;
mod config;
mod evaluation;
mod metrics;
mod replay;
mod self_play;
mod stats;
mod training;

use crate::actor::Actor;
use crate::config::Config;
use crate::replay::{EventSink, JsonlSink, NullSink};
use crate::training::TableTrainer;

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Config::parse();
    let config = cli.resolve()?;

    init_tracing(&config.common.log_level)?;
    info!(
        log_level = %config.common.log_level,
        version = %config.common.version,
        seed = config.common.seed,
        "Tracing initialized"
    );

    let puzzle = Arc::new(RotationPuzzle::new());
    let trainer = Box::new(TableTrainer::new(
        Arc::clone(&puzzle),
        config.training.learning_rate as f32,
    ));
    let sink: Box<dyn EventSink<<RotationPuzzle as Puzzle>::State>> = if cli.no_record {
        info!("Recording disabled");
        Box::new(NullSink)
    } else {
        Box::new(JsonlSink::create(
            &config.persistence.results_dir,
            &config.common.version,
        )?)
    };

    let actor = Arc::new(Actor::new(config, puzzle, trainer, sink)?);

    // Setup graceful shutdown
    let shutdown_actor = Arc::clone(&actor);
    let shutdown_handle = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current game...");
                shutdown_actor.shutdown();
            }
            Err(e) => warn!("Failed to listen for ctrl+c: {}", e),
        }
    });

    // Search threads block, so the loop runs off the async workers.
    let run_actor = Arc::clone(&actor);
    let run_result = tokio::task::spawn_blocking(move || run_actor.run())
        .await
        .context("Actor task panicked")?;

    shutdown_handle.abort();

    match run_result {
        Ok(summary) => {
            let stats = actor.stats().snapshot();
            info!(
                generations = summary.generations,
                champion = summary.champion_version,
                promotions = summary.promotions,
                distance = summary.distance,
                games = stats.games_completed,
                solve_rate = format!("{:.3}", stats.solve_rate),
                "Actor completed successfully"
            );
            Ok(())
        }
        Err(e) => {
            error!("Actor failed: {:#}", e);
            Err(e)
        }
    }
}
