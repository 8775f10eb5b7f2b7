//! Training data and the trainer seam.
//!
//! Games become `(position, policy, value)` examples. The value target is
//! the discounted outcome `decay^(moves remaining)` for solved games and 0
//! otherwise. Examples can be multiplied by the puzzle's symmetries, are
//! checked once against the run configuration, and live in a sliding
//! window of recent generations from which each training round samples.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use engine_core::{canonicalize, transform_policy, untransform_policy, Position, Puzzle};
use mcts::{EvalResult, Evaluator, EvaluatorError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::self_play::GameRecord;

const POLICY_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample<S> {
    pub position: Position<S>,
    pub policy: Vec<f32>,
    pub value: f32,
}

/// One example per move of `record`.
pub fn examples_from_game<S: Clone>(record: &GameRecord<S>, decay: f32) -> Vec<TrainingExample<S>> {
    let total = record.steps.len();
    record
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| TrainingExample {
            position: step.position.clone(),
            policy: step.policy.clone(),
            value: if record.outcome.solved {
                decay.powi((total - i) as i32)
            } else {
                0.0
            },
        })
        .collect()
}

/// Add every distinct symmetric image of each example.
///
/// The identity image comes first; transforms that map a position onto an
/// image already emitted for the same example are skipped.
pub fn augment<P: Puzzle>(
    puzzle: &P,
    examples: Vec<TrainingExample<P::State>>,
) -> Vec<TrainingExample<P::State>> {
    let symmetries = puzzle.num_symmetries();
    if symmetries <= 1 {
        return examples;
    }
    let mut out = Vec::with_capacity(examples.len() * symmetries);
    for example in examples {
        let mut seen = HashSet::with_capacity(symmetries);
        for sym in 0..symmetries {
            let position = example.position.transform(puzzle, sym);
            if !seen.insert(position.clone()) {
                continue;
            }
            out.push(TrainingExample {
                position,
                policy: transform_policy(puzzle, &example.policy, sym),
                value: example.value,
            });
        }
    }
    out
}

#[derive(Debug, Error)]
pub enum TrainingDataError {
    #[error("Training data inconsistent with configuration: {0}")]
    ConfigInconsistency(String),
}

/// What a run's examples must look like.
#[derive(Debug, Clone, Copy)]
pub struct DataShape {
    pub num_actions: usize,
    pub history: usize,
    pub cache_enabled: bool,
}

/// Check examples against the run configuration.
pub fn validate_examples<S>(
    examples: &[TrainingExample<S>],
    shape: DataShape,
) -> Result<(), TrainingDataError> {
    if shape.cache_enabled && shape.history > 1 {
        return Err(TrainingDataError::ConfigInconsistency(format!(
            "evaluation cache enabled with history {}",
            shape.history
        )));
    }
    for (i, example) in examples.iter().enumerate() {
        let previous = example.position.previous().len();
        if previous >= shape.history {
            return Err(TrainingDataError::ConfigInconsistency(format!(
                "example {i} carries {} previous states, history is {}",
                previous, shape.history
            )));
        }
        if example.policy.len() != shape.num_actions {
            return Err(TrainingDataError::ConfigInconsistency(format!(
                "example {i} policy has {} entries, puzzle has {} actions",
                example.policy.len(),
                shape.num_actions
            )));
        }
        if example.policy.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(TrainingDataError::ConfigInconsistency(format!(
                "example {i} policy has negative or non-finite entries"
            )));
        }
        let sum: f32 = example.policy.iter().sum();
        if (sum - 1.0).abs() > POLICY_SUM_TOLERANCE {
            return Err(TrainingDataError::ConfigInconsistency(format!(
                "example {i} policy sums to {sum}"
            )));
        }
        if !(0.0..=1.0).contains(&example.value) {
            return Err(TrainingDataError::ConfigInconsistency(format!(
                "example {i} value {} is outside [0, 1]",
                example.value
            )));
        }
    }
    Ok(())
}

/// Examples from the most recent generations.
#[derive(Debug)]
pub struct ReplayWindow<S> {
    generations: VecDeque<Vec<TrainingExample<S>>>,
    capacity: usize,
}

impl<S: Clone> ReplayWindow<S> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            generations: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add one generation's examples, dropping the oldest beyond capacity.
    pub fn push(&mut self, examples: Vec<TrainingExample<S>>) {
        self.generations.push_back(examples);
        while self.generations.len() > self.capacity {
            self.generations.pop_front();
        }
    }

    pub fn generations(&self) -> usize {
        self.generations.len()
    }

    pub fn len(&self) -> usize {
        self.generations.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample `ceil(ratio * len)` examples without replacement.
    pub fn sample<R: Rng + ?Sized>(&self, ratio: f64, rng: &mut R) -> Vec<TrainingExample<S>> {
        let all: Vec<&TrainingExample<S>> = self.generations.iter().flatten().collect();
        let wanted = ((ratio * all.len() as f64).ceil() as usize).min(all.len());
        all.choose_multiple(rng, wanted)
            .map(|e| (*e).clone())
            .collect()
    }
}

/// Produces the next model from sampled examples.
///
/// `base` is the current champion's oracle; implementations may start from
/// it or ignore it.
pub trait Trainer<S>: Send {
    fn train(
        &mut self,
        examples: &[TrainingExample<S>],
        base: Arc<dyn Evaluator<S>>,
    ) -> Result<Arc<dyn Evaluator<S>>>;
}

#[derive(Debug, Clone)]
struct TableEntry {
    policy: Vec<f32>,
    value: f32,
    count: u32,
}

/// Lookup-table oracle keyed by canonical state.
///
/// Positions the table has never seen go to the fallback oracle.
pub struct TableModel<P: Puzzle> {
    puzzle: Arc<P>,
    table: HashMap<P::State, TableEntry>,
    fallback: Arc<dyn Evaluator<P::State>>,
}

impl<P: Puzzle> TableModel<P> {
    fn lookup(&self, position: &Position<P::State>) -> Option<EvalResult> {
        let (canonical, sym) = canonicalize(self.puzzle.as_ref(), position.state());
        self.table.get(&canonical).map(|entry| EvalResult {
            policy: untransform_policy(self.puzzle.as_ref(), &entry.policy, sym),
            value: entry.value,
        })
    }
}

impl<P: Puzzle> Evaluator<P::State> for TableModel<P> {
    fn evaluate_batch(
        &self,
        positions: &[&Position<P::State>],
    ) -> Result<Vec<EvalResult>, EvaluatorError> {
        let mut results: Vec<Option<EvalResult>> =
            positions.iter().map(|p| self.lookup(p)).collect();

        let missing: Vec<usize> = (0..positions.len())
            .filter(|&i| results[i].is_none())
            .collect();
        if !missing.is_empty() {
            let queries: Vec<&Position<P::State>> =
                missing.iter().map(|&i| positions[i]).collect();
            let answers = self.fallback.evaluate_batch(&queries)?;
            if answers.len() != queries.len() {
                return Err(EvaluatorError::Malformed(format!(
                    "fallback returned {} results for {} positions",
                    answers.len(),
                    queries.len()
                )));
            }
            for (i, answer) in missing.into_iter().zip(answers) {
                results[i] = Some(answer);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

/// Running-average table trainer.
///
/// Each example moves its canonical entry toward the target with step
/// `max(learning_rate, 1 / count)`, so the first sighting is copied
/// verbatim. The table persists across rounds; the first `base` it is
/// given stays the fallback for unseen states.
pub struct TableTrainer<P: Puzzle> {
    puzzle: Arc<P>,
    learning_rate: f32,
    table: HashMap<P::State, TableEntry>,
    fallback: Option<Arc<dyn Evaluator<P::State>>>,
}

impl<P: Puzzle> TableTrainer<P> {
    pub fn new(puzzle: Arc<P>, learning_rate: f32) -> Self {
        Self {
            puzzle,
            learning_rate,
            table: HashMap::new(),
            fallback: None,
        }
    }

    pub fn states_learned(&self) -> usize {
        self.table.len()
    }

    fn learn(&mut self, example: &TrainingExample<P::State>) {
        let (canonical, sym) = canonicalize(self.puzzle.as_ref(), example.position.state());
        let policy = transform_policy(self.puzzle.as_ref(), &example.policy, sym);
        let entry = self.table.entry(canonical).or_insert_with(|| TableEntry {
            policy: vec![0.0; policy.len()],
            value: 0.0,
            count: 0,
        });
        entry.count += 1;
        let step = self.learning_rate.max(1.0 / entry.count as f32);
        for (current, target) in entry.policy.iter_mut().zip(&policy) {
            *current += step * (target - *current);
        }
        entry.value += step * (example.value - entry.value);
    }
}

impl<P: Puzzle> Trainer<P::State> for TableTrainer<P> {
    fn train(
        &mut self,
        examples: &[TrainingExample<P::State>],
        base: Arc<dyn Evaluator<P::State>>,
    ) -> Result<Arc<dyn Evaluator<P::State>>> {
        for example in examples {
            self.learn(example);
        }
        let fallback = Arc::clone(self.fallback.get_or_insert(base));
        debug!(
            examples = examples.len(),
            states = self.table.len(),
            "Table trainer round finished"
        );
        Ok(Arc::new(TableModel {
            puzzle: Arc::clone(&self.puzzle),
            table: self.table.clone(),
            fallback,
        }))
    }
}
