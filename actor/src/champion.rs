//! Champion registry: versioned, immutable model snapshots.
//!
//! Self-play and evaluation hold an `Arc` to the snapshot they started with,
//! so a promotion never changes the model under a running game. Each
//! snapshot owns its evaluation pipeline, which keeps cache entries from
//! one model version from leaking into another.

use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use mcts::{EvalPipeline, Evaluator, EvaluatorError, PipelineConfig};
use tracing::info;

/// One trained model version and the pipeline that queries it.
pub struct ModelSnapshot<S> {
    version: u32,
    evaluator: Arc<dyn Evaluator<S>>,
    pipeline: EvalPipeline<S>,
}

impl<S> std::fmt::Debug for ModelSnapshot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSnapshot")
            .field("version", &self.version)
            .finish()
    }
}

impl<S> ModelSnapshot<S>
where
    S: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(
        version: u32,
        evaluator: Arc<dyn Evaluator<S>>,
        config: PipelineConfig,
    ) -> Result<Self, EvaluatorError> {
        let pipeline = EvalPipeline::new(Arc::clone(&evaluator), config)?;
        Ok(Self {
            version,
            evaluator,
            pipeline,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The raw oracle, handed to the trainer as the base for the next model.
    pub fn evaluator(&self) -> Arc<dyn Evaluator<S>> {
        Arc::clone(&self.evaluator)
    }

    pub fn pipeline(&self) -> &EvalPipeline<S> {
        &self.pipeline
    }
}

/// Holds the current best model.
pub struct ChampionRegistry<S> {
    current: RwLock<Arc<ModelSnapshot<S>>>,
    promotions: AtomicU32,
}

impl<S> ChampionRegistry<S>
where
    S: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(initial: ModelSnapshot<S>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            promotions: AtomicU32::new(0),
        }
    }

    pub fn champion(&self) -> Arc<ModelSnapshot<S>> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn version(&self) -> u32 {
        self.champion().version()
    }

    pub fn promotions(&self) -> u32 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Replace the champion. Versions only move forward.
    pub fn promote(&self, challenger: Arc<ModelSnapshot<S>>) -> Result<u32> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = current.version();
        if challenger.version() <= previous {
            bail!(
                "challenger version {} does not follow champion version {}",
                challenger.version(),
                previous
            );
        }
        info!(
            previous,
            version = challenger.version(),
            "Promoting challenger to champion"
        );
        *current = challenger;
        self.promotions.fetch_add(1, Ordering::Relaxed);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcts::UniformEvaluator;

    fn snapshot(version: u32) -> ModelSnapshot<u8> {
        let evaluator: Arc<dyn Evaluator<u8>> = Arc::new(UniformEvaluator::new(2));
        ModelSnapshot::new(version, evaluator, PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_promote_swaps_champion() {
        let registry = ChampionRegistry::new(snapshot(0));
        assert_eq!(registry.version(), 0);

        let previous = registry.promote(Arc::new(snapshot(1))).unwrap();
        assert_eq!(previous, 0);
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.promotions(), 1);
    }

    #[test]
    fn test_held_snapshot_is_unchanged_by_promotion() {
        let registry = ChampionRegistry::new(snapshot(0));
        let held = registry.champion();
        registry.promote(Arc::new(snapshot(3))).unwrap();
        assert_eq!(held.version(), 0);
        assert_eq!(registry.champion().version(), 3);
    }

    #[test]
    fn test_promote_rejects_stale_version() {
        let registry = ChampionRegistry::new(snapshot(2));
        assert!(registry.promote(Arc::new(snapshot(2))).is_err());
        assert!(registry.promote(Arc::new(snapshot(1))).is_err());
        assert_eq!(registry.version(), 2);
        assert_eq!(registry.promotions(), 0);
    }

    #[test]
    fn test_snapshots_have_separate_caches() {
        let a = snapshot(0);
        let b = snapshot(1);
        assert!(!std::ptr::eq(a.pipeline(), b.pipeline()));
        assert_eq!(a.pipeline().stats().cache.len, 0);
    }
}
