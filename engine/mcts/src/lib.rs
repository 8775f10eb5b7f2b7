//! Monte Carlo Tree Search for single-agent puzzles.
//!
//! The search is generic over any `engine_core::Puzzle`. Values live in
//! `[0, 1]`: a solved state is worth 1 and every move on the way discounts
//! it by `decay`, so a node's value approximates `decay^moves_to_solve`.
//!
//! # Overview
//!
//! Each simulation:
//!
//! 1. **Selection**: descend with a decay-weighted PUCT score, adding
//!    virtual loss so concurrent workers spread out
//! 2. **Expansion**: evaluate the leaf through an [`EvalPipeline`] (cache,
//!    optional random symmetry, batching scheduler) and create one edge per
//!    legal action
//! 3. **Backpropagation**: walk back to the root, discounting by `decay`
//!    per edge
//!
//! Children that reach the same state share one node through a
//! [`TranspositionTable`] when positions carry no history.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use engine_core::{scramble, Position};
//! use games_rotation::RotationPuzzle;
//! use mcts::{run_mcts, EvalPipeline, MctsConfig, PipelineConfig, UniformEvaluator};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let puzzle = RotationPuzzle::new();
//! let pipeline = EvalPipeline::new(
//!     Arc::new(UniformEvaluator::new(8)),
//!     PipelineConfig::default(),
//! )?;
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! let start = *scramble(&puzzle, 4, &mut rng).last().unwrap();
//!
//! let result = run_mcts(
//!     &puzzle,
//!     &pipeline,
//!     &MctsConfig::for_testing(),
//!     Position::new(start),
//!     &mut rng,
//! )?;
//! println!("Best action: {}", result.action);
//! println!("Policy: {:?}", result.policy);
//! ```
//!
//! # Configuration
//!
//! [`MctsConfig`] controls one search:
//!
//! - `max_steps`: simulations per search, including root expansion (default: 1600)
//! - `exploration`: PUCT constant (default: 1.0)
//! - `decay`: per-move discount (default: 0.95)
//! - `dirichlet_const` / `dirichlet_weight`: root noise (default: 1/12, 0.25)
//! - `max_depth`: selection depth limit (default: 900)
//! - `search_threads`: concurrent workers sharing one tree (default: 1)
//!
//! [`PipelineConfig`] controls what is shared across searches for one model
//! snapshot: the evaluation cache and the batching scheduler.

pub mod batcher;
pub mod cache;
pub mod config;
pub mod evaluator;
pub mod node;
pub mod pipeline;
pub mod search;
pub mod transposition;
pub mod tree;

#[cfg(test)]
mod testing;

// Re-export main types
pub use batcher::{BatchScheduler, BatchStatsSnapshot};
pub use cache::{CacheStats, EvalCache};
pub use config::MctsConfig;
pub use evaluator::{EvalResult, Evaluator, EvaluatorError, UniformEvaluator};
pub use node::{MctsNode, NodeId};
pub use pipeline::{EvalPipeline, PipelineConfig, PipelineStats};
pub use search::{run_mcts, MctsSearch, SearchError, SearchResult, SearchStats};
pub use transposition::TranspositionTable;
pub use tree::{MctsTree, TreeStats};
