//! MCTS tree node representation.
//!
//! Each node holds a position and the statistics of its outgoing edges.
//! Edge statistics live behind a per-node mutex so worker threads can select
//! and back up through the same node concurrently. With transpositions a
//! node may have several parents, so nodes do not point back up the tree;
//! backpropagation follows the path recorded during selection.

use std::sync::{Mutex, MutexGuard};

use engine_core::Position;

/// Index into the node arena. Using a newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// Where a node is in its evaluation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expansion {
    /// Not yet sent to the oracle.
    Unexpanded,
    /// One worker has an oracle request in flight for this node.
    Pending,
    /// Priors and value estimate are known.
    Expanded,
    /// Terminal state with a fixed value.
    Terminal { value: f32 },
}

/// Statistics for one action out of a node.
#[derive(Debug, Clone)]
pub struct Edge {
    pub action: usize,

    /// Prior probability P(s,a) from the oracle (root noise mixed in).
    pub prior: f32,

    /// N(s,a)
    pub visit_count: u32,

    /// W(s,a); Q(s,a) = value_sum / visit_count
    pub value_sum: f32,

    /// Simulations currently traversing this edge.
    pub virtual_loss: u32,

    /// Created lazily the first time the edge is selected.
    pub child: NodeId,
}

impl Edge {
    pub fn new(action: usize, prior: f32) -> Self {
        Self {
            action,
            prior,
            visit_count: 0,
            value_sum: 0.0,
            virtual_loss: 0,
            child: NodeId::NONE,
        }
    }

    /// Calculate mean value Q(s,a) = value_sum / visit_count.
    /// Returns 0.0 if never visited.
    #[inline]
    pub fn mean_value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    /// Selection score with in-flight visits counted as zero-value visits.
    ///
    /// `exploration_scale` is `exploration * decay^distance * sqrt(N_parent)`,
    /// shared by every edge of the node.
    #[inline]
    pub fn score(&self, exploration_scale: f32) -> f32 {
        let visits = self.visit_count + self.virtual_loss;
        let q = if visits == 0 {
            0.0
        } else {
            self.value_sum / visits as f32
        };
        q + exploration_scale * self.prior / (1.0 + visits as f32)
    }
}

/// Exploration multiplier `exploration * decay^distance * sqrt(parent_visits)`.
///
/// Non-increasing in `distance` for `decay` in `(0, 1]`.
#[inline]
pub fn exploration_scale(exploration: f32, decay: f32, distance: u32, parent_visits: u32) -> f32 {
    exploration * decay.powi(distance as i32) * (parent_visits as f32).sqrt()
}

/// Mutable part of a node.
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub expansion: Expansion,

    /// Number of completed simulations through this node.
    pub visit_count: u32,

    /// Sum of values backed up into this node.
    pub value_sum: f32,

    /// Oracle value estimate, set on expansion.
    pub value_estimate: f32,

    /// One edge per legal action, in ascending action order.
    pub edges: Vec<Edge>,

    /// Sum of outstanding virtual loss over the edges.
    pub virtual_visits: u32,
}

impl NodeStats {
    fn new(expansion: Expansion) -> Self {
        Self {
            expansion,
            visit_count: 0,
            value_sum: 0.0,
            value_estimate: 0.0,
            edges: Vec::new(),
            virtual_visits: 0,
        }
    }

    #[inline]
    pub fn mean_value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    /// Index of the highest-scoring edge; ties go to the lowest action.
    pub fn select_edge(&self, exploration: f32, decay: f32, distance: u32) -> Option<usize> {
        let scale = exploration_scale(
            exploration,
            decay,
            distance,
            self.visit_count + self.virtual_visits,
        );
        let mut best: Option<(usize, f32)> = None;
        for (idx, edge) in self.edges.iter().enumerate() {
            let score = edge.score(scale);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn add_virtual_loss(&mut self, edge_idx: usize) {
        if let Some(edge) = self.edges.get_mut(edge_idx) {
            edge.virtual_loss += 1;
            self.virtual_visits += 1;
        }
    }

    pub fn remove_virtual_loss(&mut self, edge_idx: usize) {
        if let Some(edge) = self.edges.get_mut(edge_idx) {
            edge.virtual_loss = edge.virtual_loss.saturating_sub(1);
            self.virtual_visits = self.virtual_visits.saturating_sub(1);
        }
    }

    /// Complete one simulation through `edge_idx` with `value` as seen from
    /// this node.
    pub fn record_edge_visit(&mut self, edge_idx: usize, value: f32) {
        self.remove_virtual_loss(edge_idx);
        if let Some(edge) = self.edges.get_mut(edge_idx) {
            edge.visit_count += 1;
            edge.value_sum += value;
        }
        self.record_visit(value);
    }

    pub fn record_visit(&mut self, value: f32) {
        self.visit_count += 1;
        self.value_sum += value;
    }

    /// Visit counts indexed by action.
    pub fn visit_distribution(&self, num_actions: usize) -> Vec<u32> {
        let mut counts = vec![0; num_actions];
        for edge in &self.edges {
            if let Some(slot) = counts.get_mut(edge.action) {
                *slot = edge.visit_count;
            }
        }
        counts
    }

    /// Priors indexed by action.
    pub fn prior_distribution(&self, num_actions: usize) -> Vec<f32> {
        let mut priors = vec![0.0; num_actions];
        for edge in &self.edges {
            if let Some(slot) = priors.get_mut(edge.action) {
                *slot = edge.prior;
            }
        }
        priors
    }
}

/// A node in the MCTS tree.
#[derive(Debug)]
pub struct MctsNode<S> {
    pub position: Position<S>,

    /// Depth below the search root at creation.
    pub depth: u32,

    stats: Mutex<NodeStats>,
}

impl<S> MctsNode<S> {
    pub fn new(position: Position<S>, depth: u32, terminal_value: Option<f32>) -> Self {
        let expansion = match terminal_value {
            Some(value) => Expansion::Terminal { value },
            None => Expansion::Unexpanded,
        };
        Self {
            position,
            depth,
            stats: Mutex::new(NodeStats::new(expansion)),
        }
    }

    /// Lock the node's statistics, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, NodeStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the statistics.
    pub fn snapshot(&self) -> NodeStats {
        self.lock().clone()
    }
}
