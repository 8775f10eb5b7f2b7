//! Challenger versus champion evaluation.
//!
//! Both models play the same scrambles without root noise. A game goes to
//! the challenger when it solves a scramble the champion does not, or solves
//! it in fewer moves. The challenger is promoted when its wins exceed its
//! losses by at least the configured margin.

use anyhow::Result;
use engine_core::Puzzle;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::champion::ModelSnapshot;
use crate::self_play::{
    derive_seed, play_game, start_position, GameOutcome, GameSettings, EVALUATION_STREAM,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Challenger,
    Champion,
    Draw,
}

/// Compare two plays of the same scramble.
pub fn judge(challenger: GameOutcome, champion: GameOutcome) -> Verdict {
    match (challenger.solved, champion.solved) {
        (true, false) => Verdict::Challenger,
        (false, true) => Verdict::Champion,
        (false, false) => Verdict::Draw,
        (true, true) if challenger.moves < champion.moves => Verdict::Challenger,
        (true, true) if challenger.moves > champion.moves => Verdict::Champion,
        (true, true) => Verdict::Draw,
    }
}

pub fn should_promote(wins: u32, losses: u32, margin: i64) -> bool {
    wins as i64 - losses as i64 >= margin
}

/// Tally of an evaluation match and the promotion it implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub generation: u32,
    pub challenger_version: u32,
    pub champion_version: u32,
    pub distance: u32,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Plays that ended in an oracle error and were scored as unsolved.
    pub failures: u32,
    pub margin: i64,
    pub promoted: bool,
}

impl PromotionDecision {
    fn tally(
        generation: u32,
        challenger_version: u32,
        champion_version: u32,
        distance: u32,
        margin: i64,
    ) -> Self {
        Self {
            generation,
            challenger_version,
            champion_version,
            distance,
            games: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            failures: 0,
            margin,
            promoted: false,
        }
    }

    fn record(&mut self, verdict: Verdict) {
        self.games += 1;
        match verdict {
            Verdict::Challenger => self.wins += 1,
            Verdict::Champion => self.losses += 1,
            Verdict::Draw => self.draws += 1,
        }
    }
}

/// Play `games` evaluation games and decide on promotion.
///
/// An oracle error during one play scores that play as unsolved.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_challenger<P: Puzzle>(
    puzzle: &P,
    challenger: &ModelSnapshot<P::State>,
    champion: &ModelSnapshot<P::State>,
    settings: &GameSettings,
    generation: u32,
    distance: u32,
    games: u32,
    margin: i64,
    seed: u64,
) -> Result<PromotionDecision> {
    let settings = GameSettings {
        search: settings.search.clone().with_dirichlet(None),
        ..settings.clone()
    };
    let mut decision = PromotionDecision::tally(
        generation,
        challenger.version(),
        champion.version(),
        distance,
        margin,
    );

    for game in 0..games {
        let game_seed = derive_seed(seed, EVALUATION_STREAM, generation, game);
        let mut rng = ChaCha20Rng::seed_from_u64(game_seed);
        let start = start_position(puzzle, distance, settings.history, &mut rng);

        let mut play = |model: &ModelSnapshot<P::State>| {
            let mut rng = ChaCha20Rng::seed_from_u64(game_seed.rotate_left(17));
            match play_game(puzzle, model.pipeline(), &settings, start.clone(), &mut rng) {
                Ok(played) => played.outcome,
                Err(e) => {
                    warn!(generation, game, version = model.version(), error = %e,
                        "Evaluation game failed, scoring as unsolved");
                    decision.failures += 1;
                    GameOutcome::UNSOLVED
                }
            }
        };
        let by_challenger = play(challenger);
        let by_champion = play(champion);
        let verdict = judge(by_challenger, by_champion);
        debug!(
            game,
            ?verdict,
            challenger_moves = by_challenger.moves,
            champion_moves = by_champion.moves,
            "Evaluation game"
        );
        decision.record(verdict);
    }

    decision.promoted = should_promote(decision.wins, decision.losses, margin);
    info!(
        generation,
        challenger = decision.challenger_version,
        champion = decision.champion_version,
        wins = decision.wins,
        losses = decision.losses,
        draws = decision.draws,
        promoted = decision.promoted,
        "Evaluation finished"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_rotation::{Grid, RotationPuzzle};
    use mcts::{Evaluator, MctsConfig, PipelineConfig, UniformEvaluator};
    use std::sync::Arc;

    fn solved(moves: u32) -> GameOutcome {
        GameOutcome {
            solved: true,
            moves,
        }
    }

    fn snapshot(version: u32) -> ModelSnapshot<Grid> {
        let evaluator: Arc<dyn Evaluator<Grid>> = Arc::new(UniformEvaluator::new(8));
        ModelSnapshot::new(version, evaluator, PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_judge() {
        assert_eq!(judge(solved(3), GameOutcome::UNSOLVED), Verdict::Challenger);
        assert_eq!(judge(GameOutcome::UNSOLVED, solved(9)), Verdict::Champion);
        assert_eq!(judge(solved(3), solved(5)), Verdict::Challenger);
        assert_eq!(judge(solved(6), solved(5)), Verdict::Champion);
        assert_eq!(judge(solved(4), solved(4)), Verdict::Draw);
        assert_eq!(
            judge(GameOutcome::UNSOLVED, GameOutcome::UNSOLVED),
            Verdict::Draw
        );
    }

    #[test]
    fn test_promotion_margin() {
        assert!(should_promote(70, 58, 6));
        assert!(!should_promote(66, 62, 6));
        assert!(should_promote(10, 4, 6));
        assert!(!should_promote(0, 0, 1));
        assert!(should_promote(0, 0, 0));
        assert!(should_promote(0, 3, -3));
    }

    #[test]
    fn test_identical_models_draw() {
        let puzzle = RotationPuzzle::new();
        let settings = GameSettings {
            search: MctsConfig::for_testing().with_max_steps(24),
            move_budget: 6,
            history: 1,
        };
        let decision = evaluate_challenger(
            &puzzle,
            &snapshot(1),
            &snapshot(0),
            &settings,
            1,
            3,
            4,
            1,
            42,
        )
        .unwrap();
        assert_eq!(decision.games, 4);
        assert_eq!(decision.draws, 4);
        assert_eq!(decision.wins, 0);
        assert!(!decision.promoted);
        assert_eq!(decision.challenger_version, 1);
        assert_eq!(decision.champion_version, 0);
    }

    #[test]
    fn test_zero_games_applies_rule_to_empty_tally() {
        let puzzle = RotationPuzzle::new();
        let settings = GameSettings {
            search: MctsConfig::for_testing(),
            move_budget: 4,
            history: 1,
        };
        let decision =
            evaluate_challenger(&puzzle, &snapshot(1), &snapshot(0), &settings, 1, 2, 0, 0, 7)
                .unwrap();
        assert_eq!(decision.games, 0);
        assert!(decision.promoted);

        let decision =
            evaluate_challenger(&puzzle, &snapshot(1), &snapshot(0), &settings, 1, 2, 0, 6, 7)
                .unwrap();
        assert!(!decision.promoted);
    }
}
