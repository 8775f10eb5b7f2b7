//! Small puzzle and scripted oracle shared by the unit tests.

use std::sync::atomic::{AtomicU64, Ordering};

use engine_core::{Position, Puzzle, PuzzleMetadata, Status};

use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};

/// Walk on the integers `-n..=n`, solved at zero.
///
/// Action 0 steps right, action 1 steps left. Mirroring (`s -> -s`) is the
/// only non-trivial symmetry and swaps the two actions.
#[derive(Debug, Clone)]
pub struct Line {
    bound: i8,
}

impl Line {
    pub fn new(bound: i8) -> Self {
        Self { bound }
    }
}

impl Puzzle for Line {
    type State = i8;

    fn metadata(&self) -> PuzzleMetadata {
        PuzzleMetadata::new("line", "Line Walk")
            .with_actions(vec!["right".into(), "left".into()])
            .with_symmetries(2)
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn solved_state(&self) -> i8 {
        0
    }

    fn apply(&self, state: &i8, action: usize) -> i8 {
        match action {
            0 => (*state + 1).min(self.bound),
            _ => (*state - 1).max(-self.bound),
        }
    }

    fn status(&self, state: &i8) -> Status {
        if *state == 0 {
            Status::solved(1.0)
        } else {
            Status::ONGOING
        }
    }

    fn legal_actions(&self, state: &i8) -> Vec<usize> {
        let mut legal = Vec::with_capacity(2);
        if *state < self.bound {
            legal.push(0);
        }
        if *state > -self.bound {
            legal.push(1);
        }
        legal
    }

    fn inverse_action(&self, action: usize) -> Option<usize> {
        Some(1 - action)
    }

    fn num_symmetries(&self) -> usize {
        2
    }

    fn transform_state(&self, state: &i8, sym: usize) -> i8 {
        if sym == 0 {
            *state
        } else {
            -*state
        }
    }

    fn transform_action(&self, action: usize, sym: usize) -> usize {
        if sym == 0 {
            action
        } else {
            1 - action
        }
    }
}

/// Climb from zero to `top` in steps of one (action 0) or two (action 1).
///
/// States only increase, so the search graph has transpositions but no
/// cycles.
#[derive(Debug, Clone)]
pub struct Ladder {
    top: i8,
}

impl Ladder {
    pub fn new(top: i8) -> Self {
        Self { top }
    }
}

impl Puzzle for Ladder {
    type State = i8;

    fn metadata(&self) -> PuzzleMetadata {
        PuzzleMetadata::new("ladder", "Ladder Climb")
            .with_actions(vec!["one".into(), "two".into()])
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn solved_state(&self) -> i8 {
        self.top
    }

    fn apply(&self, state: &i8, action: usize) -> i8 {
        (*state + action as i8 + 1).min(self.top)
    }

    fn status(&self, state: &i8) -> Status {
        if *state == self.top {
            Status::solved(1.0)
        } else {
            Status::ONGOING
        }
    }

    fn legal_actions(&self, state: &i8) -> Vec<usize> {
        (0..2).filter(|&a| *state + a as i8 + 1 <= self.top).collect()
    }
}

#[derive(Debug)]
enum Script {
    /// 0.8 on the step toward zero, value `1 / (1 + |s|)`.
    TowardZero,
    Constant(Vec<f32>, f32),
}

/// Deterministic oracle for `Line` that counts the positions it sees.
#[derive(Debug)]
pub struct ScriptedEvaluator {
    script: Script,
    fail_after: Option<u64>,
    seen: AtomicU64,
}

impl ScriptedEvaluator {
    pub fn toward_zero() -> Self {
        Self {
            script: Script::TowardZero,
            fail_after: None,
            seen: AtomicU64::new(0),
        }
    }

    pub fn constant(policy: Vec<f32>, value: f32) -> Self {
        Self {
            script: Script::Constant(policy, value),
            fail_after: None,
            seen: AtomicU64::new(0),
        }
    }

    /// Answers like `toward_zero` for the first `n` positions, then fails.
    pub fn failing_after(n: u64) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::toward_zero()
        }
    }

    pub fn positions_seen(&self) -> u64 {
        self.seen.load(Ordering::SeqCst)
    }

    fn answer(&self, state: i8) -> EvalResult {
        match &self.script {
            Script::TowardZero => {
                let policy = match state.signum() {
                    1 => vec![0.2, 0.8],
                    -1 => vec![0.8, 0.2],
                    _ => vec![0.5, 0.5],
                };
                EvalResult {
                    policy,
                    value: 1.0 / (1.0 + state.unsigned_abs() as f32),
                }
            }
            Script::Constant(policy, value) => EvalResult {
                policy: policy.clone(),
                value: *value,
            },
        }
    }
}

impl Evaluator<i8> for ScriptedEvaluator {
    fn evaluate_batch(
        &self,
        positions: &[&Position<i8>],
    ) -> Result<Vec<EvalResult>, EvaluatorError> {
        let before = self
            .seen
            .fetch_add(positions.len() as u64, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if before + positions.len() as u64 > limit {
                return Err(EvaluatorError::Unavailable("scripted failure".into()));
            }
        }
        Ok(positions.iter().map(|p| self.answer(*p.state())).collect())
    }
}
