//! Self-play: scrambled games searched by the current champion.
//!
//! Every game starts `distance` random moves from the solved state and is
//! played with one MCTS search per move until the puzzle is solved or the
//! move budget runs out. The curriculum moves `distance` toward the point
//! where the champion wins about `win_rate_target` of its games.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{bail, Result};
use engine_core::{scramble, Position, Puzzle};
use indicatif::ProgressBar;
use mcts::{run_mcts, EvalPipeline, MctsConfig, SearchError, SearchResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::champion::ModelSnapshot;
use crate::metrics;

/// Seed stream for self-play games.
pub const SELF_PLAY_STREAM: u64 = 0x5e1f;
/// Seed stream for evaluation games.
pub const EVALUATION_STREAM: u64 = 0xe7a1;

/// Per-game seed derived from the run seed (splitmix64 finalizer).
pub fn derive_seed(seed: u64, stream: u64, generation: u32, game: u32) -> u64 {
    let mut z = seed
        ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ ((generation as u64) << 32 | game as u64).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// How one game is searched and when it stops.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub search: MctsConfig,
    pub move_budget: u32,
    pub history: usize,
}

/// One move of a game: the position searched, the move played and the
/// search statistics behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStep<S> {
    pub position: Position<S>,
    pub action: usize,
    pub visit_counts: Vec<u32>,
    pub policy: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub solved: bool,
    pub moves: u32,
}

impl GameOutcome {
    pub const UNSOLVED: GameOutcome = GameOutcome {
        solved: false,
        moves: 0,
    };
}

/// A finished self-play game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord<S> {
    pub generation: u32,
    pub game_index: u32,
    pub distance: u32,
    pub start: Position<S>,
    pub steps: Vec<GameStep<S>>,
    pub outcome: GameOutcome,
}

/// Search counters summed over one or more games.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchTotals {
    pub searches: u64,
    pub simulations: u64,
    pub oracle_evals: u64,
    pub cache_hits: u64,
    pub search_us: u64,
}

impl SearchTotals {
    fn add(&mut self, result: &SearchResult) {
        self.searches += 1;
        self.simulations += result.simulations as u64;
        self.oracle_evals += result.stats.oracle_evals;
        self.cache_hits += result.stats.cache_hits;
        self.search_us += result.stats.elapsed_us;
    }

    pub fn merge(&mut self, other: &SearchTotals) {
        self.searches += other.searches;
        self.simulations += other.simulations;
        self.oracle_evals += other.oracle_evals;
        self.cache_hits += other.cache_hits;
        self.search_us += other.search_us;
    }
}

/// A played game before it is tagged with generation and index.
#[derive(Debug)]
pub struct PlayedGame<S> {
    pub steps: Vec<GameStep<S>>,
    pub outcome: GameOutcome,
    pub totals: SearchTotals,
}

/// Scrambled start position with history seeded from the scramble walk.
pub fn start_position<P: Puzzle, R: Rng + ?Sized>(
    puzzle: &P,
    distance: u32,
    history: usize,
    rng: &mut R,
) -> Position<P::State> {
    let walk = scramble(puzzle, distance, rng);
    Position::from_trajectory(&walk, history)
        .unwrap_or_else(|| Position::new(puzzle.solved_state()))
}

/// Play one game from `start` with a fresh search per move.
pub fn play_game<P: Puzzle, R: Rng + ?Sized>(
    puzzle: &P,
    pipeline: &EvalPipeline<P::State>,
    settings: &GameSettings,
    start: Position<P::State>,
    rng: &mut R,
) -> Result<PlayedGame<P::State>, SearchError> {
    let mut position = start;
    let mut steps: Vec<GameStep<P::State>> = Vec::new();
    let mut totals = SearchTotals::default();

    let outcome = loop {
        let status = puzzle.status(position.state());
        if status.terminal {
            break GameOutcome {
                solved: status.is_success(),
                moves: steps.len() as u32,
            };
        }
        if steps.len() as u32 >= settings.move_budget {
            break GameOutcome {
                solved: false,
                moves: steps.len() as u32,
            };
        }

        let result = run_mcts(puzzle, pipeline, &settings.search, position.clone(), rng)?;
        totals.add(&result);
        metrics::record_search(&result);
        debug!(
            step = steps.len(),
            action = result.action,
            value = result.value,
            proven = result.proven,
            "Move selected"
        );

        let next = puzzle.apply(position.state(), result.action);
        let advanced = position.advance(next, settings.history);
        steps.push(GameStep {
            position,
            action: result.action,
            visit_counts: result.visit_counts,
            policy: result.policy,
        });
        position = advanced;
    };

    Ok(PlayedGame {
        steps,
        outcome,
        totals,
    })
}

/// Moves the scramble distance after each generation.
#[derive(Debug, Clone)]
pub struct Curriculum {
    distance: u32,
    min_distance: u32,
    step: u32,
    target: f64,
}

impl Curriculum {
    pub fn new(starting_distance: u32, min_distance: u32, step: u32, target: f64) -> Self {
        Self {
            distance: starting_distance.max(min_distance),
            min_distance,
            step,
            target,
        }
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Apply one generation's win rate and return the new distance.
    pub fn update(&mut self, win_rate: f64) -> u32 {
        if win_rate > self.target {
            self.distance = self.distance.saturating_add(self.step);
        } else if win_rate < self.target {
            self.distance = self
                .distance
                .saturating_sub(self.step)
                .max(self.min_distance);
        }
        self.distance
    }
}

/// Games from one generation of self-play.
#[derive(Debug)]
pub struct GenerationReport<S> {
    pub generation: u32,
    pub distance: u32,
    pub records: Vec<GameRecord<S>>,
    pub failed: u32,
    /// Stopped before every game was played.
    pub interrupted: bool,
    pub totals: SearchTotals,
}

impl<S> GenerationReport<S> {
    pub fn completed(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn solved(&self) -> u32 {
        self.records.iter().filter(|r| r.outcome.solved).count() as u32
    }

    /// Fraction of completed games that were solved; `None` when no game
    /// completed.
    pub fn win_rate(&self) -> Option<f64> {
        let completed = self.completed();
        (completed > 0).then(|| self.solved() as f64 / completed as f64)
    }
}

/// Play `games` self-play games with the champion at `distance`.
///
/// Games that fail with an oracle error are logged and discarded. If every
/// game fails the generation is an error. Setting `stop` ends the
/// generation after the game in progress and marks the report interrupted.
#[allow(clippy::too_many_arguments)]
pub fn run_generation<P: Puzzle>(
    puzzle: &P,
    champion: &ModelSnapshot<P::State>,
    settings: &GameSettings,
    generation: u32,
    distance: u32,
    games: u32,
    seed: u64,
    stop: &AtomicBool,
    progress: Option<&ProgressBar>,
) -> Result<GenerationReport<P::State>> {
    let mut report = GenerationReport {
        generation,
        distance,
        records: Vec::with_capacity(games as usize),
        failed: 0,
        interrupted: false,
        totals: SearchTotals::default(),
    };

    for game_index in 0..games {
        if stop.load(Ordering::Relaxed) {
            report.interrupted = true;
            break;
        }
        let started = Instant::now();
        let mut rng = ChaCha20Rng::seed_from_u64(derive_seed(
            seed,
            SELF_PLAY_STREAM,
            generation,
            game_index,
        ));
        let start = start_position(puzzle, distance, settings.history, &mut rng);

        match play_game(puzzle, champion.pipeline(), settings, start.clone(), &mut rng) {
            Ok(played) => {
                metrics::record_game(&played.outcome, started.elapsed().as_secs_f64());
                report.totals.merge(&played.totals);
                report.records.push(GameRecord {
                    generation,
                    game_index,
                    distance,
                    start,
                    steps: played.steps,
                    outcome: played.outcome,
                });
            }
            Err(e) => {
                warn!(generation, game = game_index, error = %e, "Self-play game failed, discarding");
                metrics::GAMES_FAILED.inc();
                report.failed += 1;
            }
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    if report.interrupted {
        info!(generation, completed = report.completed(), "Self-play generation interrupted");
        return Ok(report);
    }
    if games > 0 && report.records.is_empty() {
        bail!("all {games} self-play games of generation {generation} failed");
    }

    info!(
        generation,
        distance,
        completed = report.completed(),
        solved = report.solved(),
        failed = report.failed,
        win_rate = report.win_rate().unwrap_or(0.0),
        "Self-play generation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_rotation::RotationPuzzle;
    use mcts::{Evaluator, EvaluatorError, EvalResult, PipelineConfig, UniformEvaluator};
    use std::sync::Arc;

    fn settings(steps: u32, budget: u32) -> GameSettings {
        GameSettings {
            search: MctsConfig::for_testing().with_max_steps(steps),
            move_budget: budget,
            history: 1,
        }
    }

    fn uniform_champion() -> ModelSnapshot<games_rotation::Grid> {
        let evaluator: Arc<dyn Evaluator<games_rotation::Grid>> =
            Arc::new(UniformEvaluator::new(8));
        ModelSnapshot::new(0, evaluator, PipelineConfig::default()).unwrap()
    }

    #[derive(Debug)]
    struct Broken;

    impl Evaluator<games_rotation::Grid> for Broken {
        fn evaluate_batch(
            &self,
            _positions: &[&Position<games_rotation::Grid>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            Err(EvaluatorError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_curriculum_moves_toward_target() {
        let mut curriculum = Curriculum::new(3, 1, 1, 0.5);
        assert_eq!(curriculum.update(0.6), 4);
        assert_eq!(curriculum.update(0.5), 4);
        assert_eq!(curriculum.update(0.4), 3);
    }

    #[test]
    fn test_curriculum_respects_min_distance() {
        let mut curriculum = Curriculum::new(2, 2, 3, 0.5);
        assert_eq!(curriculum.update(0.0), 2);
        let curriculum = Curriculum::new(0, 1, 1, 0.5);
        assert_eq!(curriculum.distance(), 1);
    }

    #[test]
    fn test_curriculum_step_size() {
        let mut curriculum = Curriculum::new(1, 1, 2, 0.5);
        assert_eq!(curriculum.update(1.0), 3);
        assert_eq!(curriculum.update(1.0), 5);
    }

    #[test]
    fn test_derive_seed_separates_streams() {
        let a = derive_seed(42, SELF_PLAY_STREAM, 1, 0);
        assert_eq!(a, derive_seed(42, SELF_PLAY_STREAM, 1, 0));
        assert_ne!(a, derive_seed(42, EVALUATION_STREAM, 1, 0));
        assert_ne!(a, derive_seed(42, SELF_PLAY_STREAM, 1, 1));
        assert_ne!(a, derive_seed(42, SELF_PLAY_STREAM, 2, 0));
    }

    #[test]
    fn test_start_position_history() {
        let puzzle = RotationPuzzle::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let pos = start_position(&puzzle, 5, 3, &mut rng);
        assert_eq!(pos.previous().len(), 2);
        assert!(!puzzle.status(pos.state()).terminal);

        let pos = start_position(&puzzle, 5, 1, &mut rng);
        assert!(pos.previous().is_empty());
    }

    #[test]
    fn test_one_move_scramble_is_solved() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let start = start_position(&puzzle, 1, 1, &mut rng);

        let played = play_game(&puzzle, champion.pipeline(), &settings(64, 10), start, &mut rng)
            .unwrap();
        assert_eq!(played.outcome, GameOutcome { solved: true, moves: 1 });
        assert_eq!(played.steps.len(), 1);
        assert_eq!(played.totals.searches, 1);
        let step = &played.steps[0];
        assert_eq!(step.policy.iter().filter(|&&p| p > 0.0).count(), 1);
    }

    #[test]
    fn test_move_budget_ends_game() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let start = start_position(&puzzle, 12, 1, &mut rng);

        let played = play_game(&puzzle, champion.pipeline(), &settings(2, 3), start, &mut rng)
            .unwrap();
        if !played.outcome.solved {
            assert_eq!(played.outcome.moves, 3);
        }
        assert!(played.steps.len() <= 3);
    }

    #[test]
    fn test_solved_start_has_no_moves() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let played = play_game(
            &puzzle,
            champion.pipeline(),
            &settings(8, 5),
            Position::new(puzzle.solved_state()),
            &mut rng,
        )
        .unwrap();
        assert_eq!(played.outcome, GameOutcome { solved: true, moves: 0 });
    }

    #[test]
    fn test_generation_report() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let report = run_generation(
            &puzzle,
            &champion,
            &settings(32, 6),
            1,
            1,
            4,
            42,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();
        assert_eq!(report.completed(), 4);
        assert_eq!(report.failed, 0);
        assert_eq!(report.win_rate(), Some(1.0));
        assert!(report.records.iter().all(|r| r.distance == 1));
        let indices: Vec<u32> = report.records.iter().map(|r| r.game_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_generation_is_reproducible() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let a = run_generation(
            &puzzle,
            &champion,
            &settings(16, 4),
            2,
            3,
            3,
            9,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();
        let champion = uniform_champion();
        let b = run_generation(
            &puzzle,
            &champion,
            &settings(16, 4),
            2,
            3,
            3,
            9,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();
        let starts_a: Vec<_> = a.records.iter().map(|r| r.start.clone()).collect();
        let starts_b: Vec<_> = b.records.iter().map(|r| r.start.clone()).collect();
        assert_eq!(starts_a, starts_b);
    }

    #[test]
    fn test_all_failed_games_halt_generation() {
        let puzzle = RotationPuzzle::new();
        let evaluator: Arc<dyn Evaluator<games_rotation::Grid>> = Arc::new(Broken);
        let champion = ModelSnapshot::new(0, evaluator, PipelineConfig::default()).unwrap();
        let err = run_generation(
            &puzzle,
            &champion,
            &settings(8, 4),
            7,
            2,
            3,
            1,
            &AtomicBool::new(false),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("generation 7"));
    }

    #[test]
    fn test_empty_generation_has_no_win_rate() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let report = run_generation(
            &puzzle,
            &champion,
            &settings(8, 4),
            1,
            1,
            0,
            42,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();
        assert_eq!(report.win_rate(), None);
    }

    #[test]
    fn test_stop_flag_interrupts_generation() {
        let puzzle = RotationPuzzle::new();
        let champion = uniform_champion();
        let stop = AtomicBool::new(true);
        let report = run_generation(
            &puzzle,
            &champion,
            &settings(8, 4),
            1,
            1,
            5,
            42,
            &stop,
            None,
        )
        .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.completed(), 0);
    }
}
