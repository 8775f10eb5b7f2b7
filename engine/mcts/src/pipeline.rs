//! Leaf evaluation pipeline for one model snapshot.
//!
//! Every oracle request from the search goes through here:
//!
//! 1. Canonicalize the state and consult the evaluation cache.
//! 2. Otherwise optionally apply a random symmetry, send the position to the
//!    scheduler, and map the answer back into the caller's frame.
//! 3. Validate the answer, restrict the policy to legal actions and
//!    renormalize (uniform over legal actions if the oracle put no mass
//!    there).
//! 4. Store the canonical-frame answer in the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::{canonicalize, transform_policy, untransform_policy, Position, Puzzle};
use rand::Rng;
use tracing::trace;

use crate::batcher::{BatchScheduler, BatchStatsSnapshot};
use crate::cache::{CacheStats, EvalCache};
use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};

/// Settings shared by every search that uses one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cache oracle answers by canonical state.
    pub use_cache: bool,
    pub max_cache_size: usize,

    /// Number of states the oracle sees (current + previous).
    pub history: usize,

    /// Evaluate each position under a random symmetry.
    pub rotationally_randomize: bool,

    /// Batch requests from concurrent workers on a dispatcher thread.
    pub multithreaded: bool,
    pub batch_size: usize,
    pub batch_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_cache_size: 10_000,
            history: 1,
            rotationally_randomize: false,
            multithreaded: false,
            batch_size: 32,
            batch_wait: Duration::from_micros(250),
        }
    }
}

impl PipelineConfig {
    /// The cache is only sound without history.
    pub fn cache_enabled(&self) -> bool {
        self.use_cache && self.history <= 1 && self.max_cache_size > 0
    }
}

/// Counters for oracle traffic through a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub requests: u64,
    pub oracle_calls: u64,
    pub fallback_policies: u64,
    pub cache: CacheStats,
    pub batches: BatchStatsSnapshot,
}

/// Cache + scheduler + output checks for one evaluator.
#[derive(Debug)]
pub struct EvalPipeline<S> {
    scheduler: BatchScheduler<S>,
    cache: EvalCache<S>,
    config: PipelineConfig,
    requests: AtomicU64,
    oracle_calls: AtomicU64,
    fallback_policies: AtomicU64,
}

impl<S> EvalPipeline<S>
where
    S: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
{
    pub fn new(
        evaluator: Arc<dyn Evaluator<S>>,
        config: PipelineConfig,
    ) -> Result<Self, EvaluatorError> {
        let scheduler = if config.multithreaded {
            BatchScheduler::batched(evaluator, config.batch_size, config.batch_wait)?
        } else {
            BatchScheduler::inline(evaluator)
        };
        let cache = if config.cache_enabled() {
            EvalCache::new(config.max_cache_size)
        } else {
            EvalCache::disabled()
        };
        Ok(Self {
            scheduler,
            cache,
            config,
            requests: AtomicU64::new(0),
            oracle_calls: AtomicU64::new(0),
            fallback_policies: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Evaluate `position`, returning a policy restricted to `legal` actions.
    ///
    /// The boolean is true when the answer came from the cache.
    pub fn evaluate<P, R>(
        &self,
        puzzle: &P,
        position: &Position<S>,
        legal: &[usize],
        rng: &mut R,
    ) -> Result<(EvalResult, bool), EvaluatorError>
    where
        P: Puzzle<State = S>,
        R: Rng + ?Sized,
    {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let num_actions = puzzle.num_actions();

        let cache_key = (self.cache.is_enabled() && !position.has_history())
            .then(|| canonicalize(puzzle, position.state()));

        if let Some((key, sym)) = &cache_key {
            if let Some(hit) = self.cache.lookup(key) {
                let policy = untransform_policy(puzzle, &hit.policy, *sym);
                return Ok((self.finish(policy, hit.value, legal), true));
            }
        }

        let sym = if self.config.rotationally_randomize && puzzle.num_symmetries() > 1 {
            rng.gen_range(0..puzzle.num_symmetries())
        } else {
            0
        };
        let query = position.transform(puzzle, sym);

        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
        let raw = self.scheduler.evaluate(query)?;
        raw.check(num_actions)?;
        let value = raw.value.clamp(0.0, 1.0);
        let policy = untransform_policy(puzzle, &raw.policy, sym);
        trace!(sym, value, "oracle answered");

        if let Some((key, key_sym)) = cache_key {
            self.cache.insert(
                key,
                EvalResult {
                    policy: transform_policy(puzzle, &policy, key_sym),
                    value,
                },
            );
        }

        Ok((self.finish(policy, value, legal), false))
    }

    /// Mask to legal actions and renormalize.
    fn finish(&self, policy: Vec<f32>, value: f32, legal: &[usize]) -> EvalResult {
        let mut masked = vec![0.0; policy.len()];
        let mut total = 0.0;
        for &a in legal {
            if let Some(&p) = policy.get(a) {
                masked[a] = p;
                total += p;
            }
        }
        if total > 0.0 {
            for p in masked.iter_mut() {
                *p /= total;
            }
        } else if !legal.is_empty() {
            self.fallback_policies.fetch_add(1, Ordering::Relaxed);
            let uniform = 1.0 / legal.len() as f32;
            for &a in legal {
                if let Some(slot) = masked.get_mut(a) {
                    *slot = uniform;
                }
            }
        }
        EvalResult {
            policy: masked,
            value,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            requests: self.requests.load(Ordering::Relaxed),
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            fallback_policies: self.fallback_policies.load(Ordering::Relaxed),
            cache: self.cache.stats(),
            batches: self.scheduler.stats(),
        }
    }

    /// Stop the batching dispatcher. Further evaluations fail.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
