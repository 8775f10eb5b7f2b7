//! Evaluator trait for position evaluation.
//!
//! The evaluator is the value/policy oracle: for a batch of positions it
//! returns, in order, a probability distribution over the puzzle's dense
//! action space and a value estimate in `[0, 1]` (expected discounted
//! success). In training this is a neural network owned by an external
//! trainer; for testing we provide a uniform evaluator.

use std::sync::atomic::{AtomicU64, Ordering};

use engine_core::Position;
use thiserror::Error;

/// Errors that can occur during evaluation.
///
/// Cloneable so a batch-level failure can be delivered to every submitter
/// of that batch.
#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed evaluator output: {0}")]
    Malformed(String),
}

/// Result of evaluating a position.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Policy: probability distribution over actions.
    /// Index i corresponds to action i, values should sum to ~1.0.
    pub policy: Vec<f32>,

    /// Value estimate in `[0, 1]`; 1 means solved right now.
    pub value: f32,
}

impl EvalResult {
    /// Check shape and finiteness against the puzzle's action count.
    pub fn check(&self, num_actions: usize) -> Result<(), EvaluatorError> {
        if self.policy.len() != num_actions {
            return Err(EvaluatorError::Malformed(format!(
                "policy has {} entries, expected {}",
                self.policy.len(),
                num_actions
            )));
        }
        if !self.value.is_finite() {
            return Err(EvaluatorError::Malformed(format!(
                "non-finite value {}",
                self.value
            )));
        }
        if self.policy.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(EvaluatorError::Malformed(
                "policy contains negative or non-finite entries".into(),
            ));
        }
        Ok(())
    }
}

/// Trait for position evaluators.
///
/// Implementations could be:
/// - UniformEvaluator: Returns uniform policy (for testing)
/// - a lookup-table model produced by the actor's trainer
/// - neural network inference behind an FFI or RPC boundary
pub trait Evaluator<S>: Send + Sync {
    /// Evaluate a batch of positions. The output must have the same length
    /// and order as the input.
    fn evaluate_batch(&self, positions: &[&Position<S>]) -> Result<Vec<EvalResult>, EvaluatorError>;

    /// Evaluate a single position.
    fn evaluate(&self, position: &Position<S>) -> Result<EvalResult, EvaluatorError> {
        self.evaluate_batch(&[position])?
            .pop()
            .ok_or_else(|| EvaluatorError::Malformed("empty result for one position".into()))
    }
}

/// Uniform evaluator that assigns equal probability to every action.
/// Value is always 0.0. Useful for testing MCTS without a model; the search
/// masks illegal actions itself.
#[derive(Debug, Default)]
pub struct UniformEvaluator {
    num_actions: usize,
    calls: AtomicU64,
}

impl UniformEvaluator {
    pub fn new(num_actions: usize) -> Self {
        Self {
            num_actions,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of positions evaluated so far.
    pub fn positions_evaluated(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<S> Evaluator<S> for UniformEvaluator {
    fn evaluate_batch(&self, positions: &[&Position<S>]) -> Result<Vec<EvalResult>, EvaluatorError> {
        self.calls
            .fetch_add(positions.len() as u64, Ordering::Relaxed);
        let prob = if self.num_actions == 0 {
            0.0
        } else {
            1.0 / self.num_actions as f32
        };
        Ok(positions
            .iter()
            .map(|_| EvalResult {
                policy: vec![prob; self.num_actions],
                value: 0.0,
            })
            .collect())
    }
}
