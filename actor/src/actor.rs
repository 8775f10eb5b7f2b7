//! The generation loop.
//!
//! Each generation: self-play with the champion, turn games into examples,
//! push them into the replay window, move the curriculum, train a
//! challenger on a window sample, evaluate it against the champion and
//! promote it if it clears the margin.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use engine_config::CentralConfig;
use engine_core::Puzzle;
use indicatif::{ProgressBar, ProgressStyle};
use mcts::{Evaluator, UniformEvaluator};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, warn};

use crate::champion::{ChampionRegistry, ModelSnapshot};
use crate::config::{evaluation_search, pipeline_config, training_search};
use crate::evaluation::evaluate_challenger;
use crate::metrics;
use crate::replay::{load_examples, EventSink};
use crate::self_play::{run_generation, Curriculum, GameSettings};
use crate::stats::{ActorStats, GenerationSummary};
use crate::training::{
    augment, examples_from_game, validate_examples, DataShape, ReplayWindow, Trainer,
};

/// Where a run ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub generations: u32,
    pub champion_version: u32,
    pub promotions: u32,
    pub distance: u32,
    pub interrupted: bool,
}

pub struct Actor<P: Puzzle> {
    config: CentralConfig,
    puzzle: Arc<P>,
    registry: ChampionRegistry<P::State>,
    trainer: Mutex<Box<dyn Trainer<P::State>>>,
    sink: Mutex<Box<dyn EventSink<P::State>>>,
    stats: ActorStats,
    run_dir: PathBuf,
    shutdown_signal: AtomicBool,
}

impl<P: Puzzle> Actor<P> {
    /// Build an actor whose first champion is the uniform oracle (version 0).
    pub fn new(
        config: CentralConfig,
        puzzle: Arc<P>,
        trainer: Box<dyn Trainer<P::State>>,
        sink: Box<dyn EventSink<P::State>>,
    ) -> Result<Self> {
        let metadata = puzzle.metadata();
        let initial: Arc<dyn Evaluator<P::State>> =
            Arc::new(UniformEvaluator::new(puzzle.num_actions()));
        let champion = ModelSnapshot::new(0, initial, pipeline_config(&config))
            .context("Failed to start the initial evaluation pipeline")?;

        let run_dir =
            PathBuf::from(&config.persistence.results_dir).join(&config.common.version);
        let stats = ActorStats::new(&run_dir.to_string_lossy(), &metadata.puzzle_id);

        metrics::init_metrics();
        metrics::set_run_info(&metadata.puzzle_id, &config.common.version);

        info!(
            puzzle = %metadata.display_name,
            actions = puzzle.num_actions(),
            symmetries = puzzle.num_symmetries(),
            version = %config.common.version,
            cache = config.cache_enabled(),
            transposition_table = config.transposition_table_enabled(),
            "Actor initialized"
        );

        Ok(Self {
            config,
            puzzle,
            registry: ChampionRegistry::new(champion),
            trainer: Mutex::new(trainer),
            sink: Mutex::new(sink),
            stats,
            run_dir,
            shutdown_signal: AtomicBool::new(false),
        })
    }

    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
        info!("Shutdown signal set");
    }

    pub fn champion_version(&self) -> u32 {
        self.registry.version()
    }

    pub fn stats(&self) -> &ActorStats {
        &self.stats
    }

    fn lock_sink(&self) -> Result<MutexGuard<'_, Box<dyn EventSink<P::State>>>> {
        self.sink
            .lock()
            .map_err(|e| anyhow!("Failed to acquire event sink lock: {}", e))
    }

    fn lock_trainer(&self) -> Result<MutexGuard<'_, Box<dyn Trainer<P::State>>>> {
        self.trainer
            .lock()
            .map_err(|e| anyhow!("Failed to acquire trainer lock: {}", e))
    }

    /// Fill the window from earlier runs, most recent generations first.
    fn warm_start(&self, window: &mut ReplayWindow<P::State>) -> Result<usize> {
        let mut recent = Vec::new();
        'versions: for version in &self.config.persistence.prev_versions {
            let mut generations = load_examples(&self.config.persistence.results_dir, version)
                .with_context(|| format!("Failed to warm-start from version {version}"))?;
            while let Some((generation, examples)) = generations.pop() {
                if recent.len() >= window.capacity() {
                    break 'versions;
                }
                debug!(
                    version = %version,
                    generation,
                    examples = examples.len(),
                    "Warm-start generation"
                );
                recent.push(examples);
            }
        }
        let loaded: usize = recent.iter().map(Vec::len).sum();
        for examples in recent.into_iter().rev() {
            window.push(examples);
        }
        if loaded > 0 {
            info!(
                examples = loaded,
                generations = window.generations(),
                "Replay window warm-started"
            );
        }
        Ok(loaded)
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        let games = self.config.self_play.games_per_generation as u64;
        if games == 0 || !std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            return None;
        }
        let pb = ProgressBar::new(games);
        let style = ProgressStyle::default_bar().template(
            "{spinner:.green} gen {msg} [{bar:40.cyan/blue}] {pos}/{len} games ({eta})",
        );
        match style {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(e) => warn!("Invalid progress template: {}", e),
        }
        Some(pb)
    }

    /// Run generations until the configured count or a shutdown request.
    pub fn run(&self) -> Result<RunSummary> {
        let cfg = &self.config;
        let puzzle = self.puzzle.as_ref();
        let seed = cfg.common.seed;
        let mut rng = ChaCha20Rng::seed_from_u64(seed);

        let mut window = ReplayWindow::new(cfg.replay_window());
        self.warm_start(&mut window)?;

        let mut curriculum = Curriculum::new(
            cfg.self_play.starting_distance,
            cfg.self_play.min_distance,
            cfg.self_play.distance_step,
            cfg.self_play.win_rate_target,
        );
        let self_play = GameSettings {
            search: training_search(cfg),
            move_budget: cfg.move_budget(),
            history: cfg.model.history,
        };
        let evaluation = GameSettings {
            search: evaluation_search(cfg),
            ..self_play.clone()
        };
        let shape = DataShape {
            num_actions: puzzle.num_actions(),
            history: cfg.model.history,
            cache_enabled: cfg.cache_enabled(),
        };
        let mut needs_validation = cfg.training.validate_training_data;
        let decay = cfg.mcts.decay as f32;

        info!(
            generations = cfg.training.generations,
            games = cfg.self_play.games_per_generation,
            move_budget = self_play.move_budget,
            window = window.capacity(),
            "Actor starting generation loop"
        );

        let progress = self.progress_bar();
        let mut completed = 0;
        let mut interrupted = false;

        for generation in 1..=cfg.training.generations {
            if self.shutdown_signal.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping before generation {generation}");
                interrupted = true;
                break;
            }
            let started = Instant::now();
            let champion = self.registry.champion();
            let distance = curriculum.distance();

            if let Some(pb) = &progress {
                pb.reset();
                pb.set_message(generation.to_string());
            }
            let report = run_generation(
                puzzle,
                &champion,
                &self_play,
                generation,
                distance,
                cfg.self_play.games_per_generation,
                seed,
                &self.shutdown_signal,
                progress.as_ref(),
            )
            .with_context(|| format!("Self-play failed in generation {generation}"))?;
            if report.interrupted {
                info!("Shutdown signal received, discarding partial generation {generation}");
                interrupted = true;
                break;
            }

            let mut sink = self.lock_sink()?;
            for record in &report.records {
                self.stats
                    .record_game(record.outcome.moves, record.outcome.solved);
                sink.record_game(record).with_context(|| {
                    format!(
                        "Failed to record game {} of generation {generation}",
                        record.game_index
                    )
                })?;
            }
            self.stats.record_failures(report.failed);
            self.stats.record_searches(&report.totals);

            let mut examples: Vec<_> = report
                .records
                .iter()
                .flat_map(|record| examples_from_game(record, decay))
                .collect();
            if cfg.training.augment_training_data {
                examples = augment(puzzle, examples);
            }
            if needs_validation {
                validate_examples(&examples, shape).with_context(|| {
                    format!("Training data check failed in generation {generation}")
                })?;
                needs_validation = false;
            }
            sink.record_examples(generation, &examples)?;
            let example_count = examples.len();
            window.push(examples);

            let win_rate = report.win_rate();
            let next_distance = match win_rate {
                Some(rate) => curriculum.update(rate),
                None => curriculum.distance(),
            };

            let sample = window.sample(cfg.training.training_sample_ratio, &mut rng);
            let mut challenger_version = None;
            let mut promoted = None;
            if sample.is_empty() {
                debug!(generation, "Replay window empty, skipping training");
            } else {
                let model = self
                    .lock_trainer()?
                    .train(&sample, champion.evaluator())
                    .with_context(|| format!("Training failed in generation {generation}"))?;
                let challenger = Arc::new(
                    ModelSnapshot::new(generation, model, pipeline_config(cfg))
                        .context("Failed to start the challenger pipeline")?,
                );
                let decision = evaluate_challenger(
                    puzzle,
                    &challenger,
                    &champion,
                    &evaluation,
                    generation,
                    distance,
                    cfg.evaluation.games_per_evaluation,
                    cfg.evaluation.win_margin_to_become_best_model,
                    seed,
                )
                .with_context(|| format!("Evaluation failed in generation {generation}"))?;
                sink.record_promotion(&decision)?;
                metrics::record_promotion(&decision);
                if decision.promoted {
                    self.registry.promote(Arc::clone(&challenger))?;
                }
                challenger_version = Some(challenger.version());
                promoted = Some(decision.promoted);
            }

            metrics::record_pipeline(&champion.pipeline().stats());
            let champion_version = self.registry.version();
            metrics::record_generation(next_distance, win_rate, champion_version);
            self.stats.record_generation(promoted.unwrap_or(false));

            let summary = GenerationSummary {
                generation,
                champion_version,
                distance,
                next_distance,
                games: report.completed(),
                solved: report.solved(),
                failed: report.failed,
                win_rate,
                examples: example_count,
                sampled: sample.len(),
                challenger_version,
                promoted,
                elapsed_secs: started.elapsed().as_secs_f64(),
            };
            sink.record_generation(&summary)?;
            drop(sink);

            let log = || {
                info!(
                    generation,
                    distance,
                    next_distance,
                    win_rate = win_rate.unwrap_or(0.0),
                    examples = example_count,
                    window = window.len(),
                    champion = champion_version,
                    promoted = promoted.unwrap_or(false),
                    elapsed = format!("{:.2}s", summary.elapsed_secs),
                    "Generation complete"
                )
            };
            match &progress {
                Some(pb) => pb.suspend(log),
                None => log(),
            }
            self.stats.write_stats();
            completed = generation;
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        self.lock_sink()?.flush()?;
        self.stats.write_stats();
        metrics::write_metrics(&self.run_dir.join("metrics.prom"));

        let summary = RunSummary {
            generations: completed,
            champion_version: self.registry.version(),
            promotions: self.registry.promotions(),
            distance: curriculum.distance(),
            interrupted,
        };
        info!(?summary, "Actor stopped");
        Ok(summary)
    }
}
