//! MCTS search implementation.
//!
//! Implements decay-weighted PUCT search:
//! 1. Selection: descend by `Q + c * decay^d * P * sqrt(N) / (1 + n)`,
//!    adding virtual loss to every traversed edge
//! 2. Expansion: the first worker to reach an unexpanded node marks it
//!    pending and asks the evaluation pipeline for priors and a value
//! 3. Backpropagation: walk the recorded path back to the root, multiplying
//!    the value by `decay` per edge
//!
//! The first simulation expands the root; Dirichlet noise is then mixed into
//! the root priors once. The remaining simulations run on the caller's thread
//! or on `search_threads` scoped workers sharing one tree.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use engine_core::{Position, Puzzle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::MctsConfig;
use crate::evaluator::EvaluatorError;
use crate::node::{Edge, Expansion, MctsNode, NodeId};
use crate::pipeline::EvalPipeline;
use crate::transposition::TranspositionTable;
use crate::tree::{MctsTree, PathStep};

/// Errors that can occur during MCTS search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Evaluator error: {0}")]
    Evaluation(#[from] EvaluatorError),

    #[error("Search root is already terminal")]
    TerminalRoot,

    #[error("No legal actions at the search root")]
    NoLegalActions,

    #[error("Invalid search config: {0}")]
    InvalidConfig(String),

    #[error("Search worker panicked")]
    WorkerPanicked,
}

/// Result of an MCTS search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best action to take
    pub action: usize,

    /// Policy over all actions: visit-proportional, the raw priors if no
    /// edge was visited, or one-hot on a proven solving move.
    pub policy: Vec<f32>,

    /// Root edge visit counts indexed by action
    pub visit_counts: Vec<u32>,

    /// Mean backed-up value at root
    pub value: f32,

    /// Number of simulations performed (root visit count)
    pub simulations: u32,

    /// A root action leads straight to the solved state
    pub proven: bool,

    pub stats: SearchStats,
}

/// Per-search counters.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub expansions: u64,
    pub oracle_evals: u64,
    pub cache_hits: u64,
    pub collisions: u64,
    pub cycles: u64,
    pub depth_cutoffs: u64,
    pub dead_ends: u64,
    pub transposition_hits: u64,
    pub nodes: usize,
    pub max_depth: u32,
    pub elapsed_us: u64,
}

#[derive(Debug, Default)]
struct Counters {
    expansions: AtomicU64,
    oracle_evals: AtomicU64,
    cache_hits: AtomicU64,
    collisions: AtomicU64,
    cycles: AtomicU64,
    depth_cutoffs: AtomicU64,
    dead_ends: AtomicU64,
    transposition_hits: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// How one simulation ended.
enum Outcome {
    Completed,
    /// Reached a node another worker is evaluating; nothing was recorded.
    Collision,
}

/// Shared simulation budget for the worker pool.
struct Budget {
    limit: u32,
    claimed: AtomicU32,
    completed: AtomicU32,
    stop: AtomicBool,
    error: Mutex<Option<SearchError>>,
}

impl Budget {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            claimed: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            stop: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    fn try_claim(&self) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return false;
        }
        if self.claimed.fetch_add(1, Ordering::AcqRel) < self.limit {
            true
        } else {
            self.claimed.fetch_sub(1, Ordering::AcqRel);
            false
        }
    }

    fn release(&self) {
        self.claimed.fetch_sub(1, Ordering::AcqRel);
    }

    fn complete(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn halt(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Keep the first error and stop every worker.
    fn fail(&self, err: SearchError) {
        let mut slot = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
        self.halt();
    }

    fn take_error(&self) -> Option<SearchError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// MCTS search state for one root position.
pub struct MctsSearch<'a, P: Puzzle> {
    puzzle: &'a P,
    pipeline: &'a EvalPipeline<P::State>,
    config: &'a MctsConfig,
    tree: MctsTree<P::State>,
    transpositions: Option<TranspositionTable<P::State>>,
    counters: Counters,
    num_actions: usize,
    history: usize,
    proven: AtomicBool,
}

impl<'a, P: Puzzle> MctsSearch<'a, P> {
    /// Create a new MCTS search rooted at `root`.
    pub fn new(
        puzzle: &'a P,
        pipeline: &'a EvalPipeline<P::State>,
        config: &'a MctsConfig,
        root: Position<P::State>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if puzzle.status(root.state()).terminal {
            return Err(SearchError::TerminalRoot);
        }

        let history = pipeline.config().history.max(1);
        let transpositions = (config.use_transposition_table && history == 1).then(|| {
            let table = TranspositionTable::new();
            table.insert(root.state().clone(), NodeId(0));
            table
        });

        Ok(Self {
            puzzle,
            pipeline,
            config,
            tree: MctsTree::new(root, None),
            transpositions,
            counters: Counters::default(),
            num_actions: puzzle.num_actions(),
            history,
            proven: AtomicBool::new(false),
        })
    }

    /// Run the search until the simulation budget is spent, the root is
    /// proven solved, or an evaluation fails.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SearchResult, SearchError> {
        let start = Instant::now();

        // Simulation 1 expands the root.
        self.simulate(rng)?;
        if self.tree.get(self.tree.root()).lock().edges.is_empty() {
            return Err(SearchError::NoLegalActions);
        }
        if let Some(alpha) = self.config.dirichlet_const {
            self.add_dirichlet_noise(alpha, rng);
        }

        let budget = Budget::new(self.config.max_steps.saturating_sub(1));
        if self.config.search_threads <= 1 {
            self.worker(&budget, rng);
        } else {
            let seeds: Vec<u64> = (0..self.config.search_threads).map(|_| rng.gen()).collect();
            let budget_ref = &budget;
            std::thread::scope(|scope| {
                let handles: Vec<_> = seeds
                    .into_iter()
                    .map(|seed| {
                        scope.spawn(move || {
                            let mut worker_rng = ChaCha20Rng::seed_from_u64(seed);
                            self.worker(budget_ref, &mut worker_rng);
                        })
                    })
                    .collect();
                for handle in handles {
                    if handle.join().is_err() {
                        budget_ref.fail(SearchError::WorkerPanicked);
                    }
                }
            });
        }
        if let Some(err) = budget.take_error() {
            return Err(err);
        }

        let result = self.finish(start);
        debug!(
            action = result.action,
            simulations = result.simulations,
            value = result.value,
            proven = result.proven,
            nodes = result.stats.nodes,
            "MCTS search complete"
        );
        Ok(result)
    }

    fn worker<R: Rng + ?Sized>(&self, budget: &Budget, rng: &mut R) {
        while budget.try_claim() {
            match self.simulate(rng) {
                Ok(Outcome::Completed) => budget.complete(),
                Ok(Outcome::Collision) => {
                    budget.release();
                    std::thread::yield_now();
                }
                Err(err) => {
                    budget.release();
                    budget.fail(err);
                    return;
                }
            }
            if self.proven.load(Ordering::Acquire) {
                budget.halt();
            }
        }
    }

    /// Run a single simulation (select -> expand -> backpropagate).
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Outcome, SearchError> {
        let decay = self.config.decay;
        let mut path: Vec<PathStep> = Vec::new();
        let mut node_id = self.tree.root();
        let mut on_path: HashSet<P::State> = HashSet::new();
        on_path.insert(self.tree.get(node_id).position.state().clone());

        loop {
            let node = self.tree.get(node_id);
            let mut stats = node.lock();
            let depth = path.len() as u32;

            match stats.expansion {
                Expansion::Terminal { value } => {
                    drop(stats);
                    if depth == 1 && value > 0.0 {
                        self.proven.store(true, Ordering::Release);
                    }
                    self.tree.backpropagate(&path, Some(node_id), value, decay);
                    trace!(depth, value, "simulation reached terminal");
                    return Ok(Outcome::Completed);
                }
                Expansion::Pending => {
                    drop(stats);
                    self.tree.remove_virtual_loss(&path);
                    bump(&self.counters.collisions);
                    return Ok(Outcome::Collision);
                }
                Expansion::Unexpanded => {
                    stats.expansion = Expansion::Pending;
                    drop(stats);
                    return self.expand(node_id, &node, &path, rng);
                }
                Expansion::Expanded => {}
            }

            if depth >= self.config.max_depth && !stats.edges.is_empty() {
                let value = stats.value_estimate;
                drop(stats);
                bump(&self.counters.depth_cutoffs);
                self.tree.backpropagate(&path, Some(node_id), value, decay);
                return Ok(Outcome::Completed);
            }
            let Some(edge_idx) = stats.select_edge(self.config.exploration, decay, depth) else {
                drop(stats);
                bump(&self.counters.dead_ends);
                self.tree.backpropagate(&path, Some(node_id), 0.0, decay);
                return Ok(Outcome::Completed);
            };

            stats.add_virtual_loss(edge_idx);
            let (existing, action) = {
                let edge = &stats.edges[edge_idx];
                (edge.child, edge.action)
            };
            let child = if existing.is_some() {
                existing
            } else {
                let created = self.child_for(&node, action, depth + 1);
                stats.edges[edge_idx].child = created;
                created
            };
            drop(stats);

            path.push((node_id, edge_idx));
            let child_state = self.tree.get(child).position.state().clone();
            if !on_path.insert(child_state) {
                // Revisiting a state on the current path never helps.
                bump(&self.counters.cycles);
                self.tree.backpropagate(&path, None, 0.0, decay);
                return Ok(Outcome::Completed);
            }
            node_id = child;
        }
    }

    /// Node reached by `action` from `parent`, shared through the
    /// transposition table when enabled.
    fn child_for(&self, parent: &MctsNode<P::State>, action: usize, depth: u32) -> NodeId {
        let next = self.puzzle.apply(parent.position.state(), action);
        let status = self.puzzle.status(&next);
        let terminal = status.terminal.then_some(status.reward);
        let position = parent.position.advance(next.clone(), self.history);

        match &self.transpositions {
            Some(table) => {
                let (id, created) =
                    table.get_or_create(next, || self.tree.allocate(position, depth, terminal));
                if !created {
                    bump(&self.counters.transposition_hits);
                }
                id
            }
            None => self.tree.allocate(position, depth, terminal),
        }
    }

    /// Evaluate a pending leaf, install its edges and back up its value.
    fn expand<R: Rng + ?Sized>(
        &self,
        node_id: NodeId,
        node: &MctsNode<P::State>,
        path: &[PathStep],
        rng: &mut R,
    ) -> Result<Outcome, SearchError> {
        let legal = self.puzzle.legal_actions(node.position.state());
        let (eval, cached) = match self.pipeline.evaluate(self.puzzle, &node.position, &legal, rng) {
            Ok(answer) => answer,
            Err(err) => {
                node.lock().expansion = Expansion::Unexpanded;
                self.tree.remove_virtual_loss(path);
                return Err(err.into());
            }
        };

        bump(&self.counters.expansions);
        if cached {
            bump(&self.counters.cache_hits);
        } else {
            bump(&self.counters.oracle_evals);
        }

        {
            let mut stats = node.lock();
            stats.edges = legal
                .iter()
                .map(|&a| Edge::new(a, eval.policy.get(a).copied().unwrap_or(0.0)))
                .collect();
            stats.value_estimate = eval.value;
            stats.expansion = Expansion::Expanded;
        }
        self.tree
            .backpropagate(path, Some(node_id), eval.value, self.config.decay);

        trace!(
            node = node_id.0,
            depth = path.len(),
            value = eval.value,
            cached,
            "MCTS simulation complete"
        );
        Ok(Outcome::Completed)
    }

    /// Add Dirichlet noise to root priors for exploration.
    fn add_dirichlet_noise<R: Rng + ?Sized>(&self, alpha: f32, rng: &mut R) {
        let root = self.tree.get(self.tree.root());
        let mut stats = root.lock();
        let n = stats.edges.len();
        if n < 2 {
            return;
        }

        let noise = dirichlet_noise(n, alpha, rng);
        let eps = self.config.dirichlet_weight;
        for (edge, eta) in stats.edges.iter_mut().zip(noise) {
            edge.prior = (1.0 - eps) * edge.prior + eps * eta;
        }
    }

    fn finish(&self, start: Instant) -> SearchResult {
        let root = self.tree.get(self.tree.root()).snapshot();
        let visit_counts = root.visit_distribution(self.num_actions);
        let tree_stats = self.tree.stats();

        let proven_action = self.tree.proven_action();
        let (action, policy) = match proven_action {
            Some(action) => {
                let mut one_hot = vec![0.0; self.num_actions];
                one_hot[action] = 1.0;
                (action, one_hot)
            }
            None => (
                self.tree.best_action().unwrap_or(0),
                self.tree.root_policy(self.num_actions),
            ),
        };

        let c = &self.counters;
        SearchResult {
            action,
            policy,
            visit_counts,
            value: root.mean_value(),
            simulations: root.visit_count,
            proven: proven_action.is_some(),
            stats: SearchStats {
                expansions: c.expansions.load(Ordering::Relaxed),
                oracle_evals: c.oracle_evals.load(Ordering::Relaxed),
                cache_hits: c.cache_hits.load(Ordering::Relaxed),
                collisions: c.collisions.load(Ordering::Relaxed),
                cycles: c.cycles.load(Ordering::Relaxed),
                depth_cutoffs: c.depth_cutoffs.load(Ordering::Relaxed),
                dead_ends: c.dead_ends.load(Ordering::Relaxed),
                transposition_hits: c.transposition_hits.load(Ordering::Relaxed),
                nodes: tree_stats.total_nodes,
                max_depth: tree_stats.max_depth,
                elapsed_us: start.elapsed().as_micros() as u64,
            },
        }
    }

    /// Get the search tree (for inspection/debugging).
    pub fn tree(&self) -> &MctsTree<P::State> {
        &self.tree
    }
}

/// Generate Dirichlet-distributed noise using Gamma variates.
fn dirichlet_noise<R: Rng + ?Sized>(n: usize, alpha: f32, rng: &mut R) -> Vec<f32> {
    use rand_distr::{Distribution, Gamma};

    let Ok(gamma) = Gamma::new(alpha as f64, 1.0) else {
        return vec![1.0 / n as f32; n];
    };
    let mut samples: Vec<f32> = (0..n).map(|_| gamma.sample(rng) as f32).collect();

    // Normalize
    let sum: f32 = samples.iter().sum();
    if sum > 0.0 {
        for s in &mut samples {
            *s /= sum;
        }
    } else {
        samples.fill(1.0 / n as f32);
    }

    samples
}

/// Convenience function to run a single MCTS search.
pub fn run_mcts<P: Puzzle, R: Rng + ?Sized>(
    puzzle: &P,
    pipeline: &EvalPipeline<P::State>,
    config: &MctsConfig,
    root: Position<P::State>,
    rng: &mut R,
) -> Result<SearchResult, SearchError> {
    MctsSearch::new(puzzle, pipeline, config, root)?.run(rng)
}
