//! MCTS tree structure with arena allocation.
//!
//! Nodes are stored in an append-only arena and referenced by `NodeId`
//! indices. The arena itself sits behind a `RwLock` so worker threads can
//! allocate children while others read; each node carries its own lock for
//! statistics.

use std::sync::{Arc, RwLock};

use engine_core::Position;

use crate::node::{Expansion, MctsNode, NodeId};

/// One step of a selection path: the node and the edge index taken from it.
pub type PathStep = (NodeId, usize);

/// MCTS tree with arena-based node storage.
#[derive(Debug)]
pub struct MctsTree<S> {
    /// Arena storing all nodes
    nodes: RwLock<Vec<Arc<MctsNode<S>>>>,

    /// Root node index (always 0)
    root: NodeId,
}

impl<S> MctsTree<S> {
    /// Create a new tree with the given root position.
    pub fn new(root: Position<S>, terminal_value: Option<f32>) -> Self {
        Self {
            nodes: RwLock::new(vec![Arc::new(MctsNode::new(root, 0, terminal_value))]),
            root: NodeId(0),
        }
    }

    /// Get the root node ID.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID. IDs come from `allocate` and are always in range.
    #[inline]
    pub fn get(&self, id: NodeId) -> Arc<MctsNode<S>> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&nodes[id.0 as usize])
    }

    /// Allocate a new node and return its ID.
    pub fn allocate(&self, position: Position<S>, depth: u32, terminal_value: Option<f32>) -> NodeId {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let id = NodeId(nodes.len() as u32);
        nodes.push(Arc::new(MctsNode::new(position, depth, terminal_value)));
        id
    }

    /// Get the total number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if tree is empty (never true after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Back up `value` from the end of `path`.
    ///
    /// `leaf` (if any) receives `value` unchanged; every edge on the path,
    /// walking towards the root, multiplies the value by `decay` first.
    pub fn backpropagate(&self, path: &[PathStep], leaf: Option<NodeId>, value: f32, decay: f32) {
        if let Some(leaf_id) = leaf {
            self.get(leaf_id).lock().record_visit(value);
        }
        let mut current = value;
        for &(node_id, edge_idx) in path.iter().rev() {
            current *= decay;
            self.get(node_id).lock().record_edge_visit(edge_idx, current);
        }
    }

    /// Undo the virtual loss of an abandoned simulation.
    pub fn remove_virtual_loss(&self, path: &[PathStep]) {
        for &(node_id, edge_idx) in path {
            self.get(node_id).lock().remove_virtual_loss(edge_idx);
        }
    }

    /// Visit counts of the root's edges, indexed by action.
    pub fn root_visits(&self, num_actions: usize) -> Vec<u32> {
        self.get(self.root).lock().visit_distribution(num_actions)
    }

    /// Visit-proportional policy at the root.
    ///
    /// Falls back to the root priors when no edge has been visited yet (a
    /// one-simulation search only expands the root).
    pub fn root_policy(&self, num_actions: usize) -> Vec<f32> {
        let stats = self.get(self.root).snapshot();
        let visits = stats.visit_distribution(num_actions);
        let total: u32 = visits.iter().sum();
        if total == 0 {
            return stats.prior_distribution(num_actions);
        }
        visits
            .iter()
            .map(|&v| v as f32 / total as f32)
            .collect()
    }

    /// Most visited root action; ties (including the all-zero case, judged
    /// by prior) go to the lowest action.
    pub fn best_action(&self) -> Option<usize> {
        let stats = self.get(self.root).snapshot();
        let mut best: Option<(usize, u32, f32)> = None;
        for edge in &stats.edges {
            let better = match best {
                None => true,
                Some((_, visits, prior)) => {
                    edge.visit_count > visits || (edge.visit_count == visits && edge.prior > prior)
                }
            };
            if better {
                best = Some((edge.action, edge.visit_count, edge.prior));
            }
        }
        best.map(|(action, _, _)| action)
    }

    /// Lowest root action whose child is a solved terminal state.
    pub fn proven_action(&self) -> Option<usize> {
        let stats = self.get(self.root).snapshot();
        stats
            .edges
            .iter()
            .filter(|edge| edge.child.is_some())
            .find(|edge| {
                matches!(self.get(edge.child).lock().expansion,
                    Expansion::Terminal { value } if value > 0.0)
            })
            .map(|edge| edge.action)
    }

    /// Get statistics about the tree for debugging.
    pub fn stats(&self) -> TreeStats {
        let root = self.get(self.root).snapshot();
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        TreeStats {
            total_nodes: nodes.len(),
            root_visits: root.visit_count,
            root_value: root.mean_value(),
            max_depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
        }
    }
}

/// Statistics about an MCTS tree.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: u32,
    pub root_value: f32,
    pub max_depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Edge;

    fn expand(tree: &MctsTree<u8>, id: NodeId, priors: &[f32]) {
        let node = tree.get(id);
        let mut stats = node.lock();
        stats.expansion = Expansion::Expanded;
        stats.edges = priors
            .iter()
            .enumerate()
            .map(|(a, &p)| Edge::new(a, p))
            .collect();
    }

    #[test]
    fn test_new_tree() {
        let tree = MctsTree::new(Position::new(5u8), None);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), NodeId(0));
        assert_eq!(*tree.get(tree.root()).position.state(), 5);
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_allocate() {
        let tree = MctsTree::new(Position::new(0u8), None);
        let child = tree.allocate(Position::new(1), 1, Some(1.0));
        assert_eq!(child, NodeId(1));
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get(child).lock().expansion,
            Expansion::Terminal { value: 1.0 }
        );
    }

    #[test]
    fn test_backpropagate_applies_decay_per_edge() {
        let tree = MctsTree::new(Position::new(0u8), None);
        let root = tree.root();
        expand(&tree, root, &[1.0]);
        let child = tree.allocate(Position::new(1), 1, None);
        expand(&tree, child, &[1.0]);
        let leaf = tree.allocate(Position::new(2), 2, Some(1.0));

        tree.get(root).lock().add_virtual_loss(0);
        tree.get(child).lock().add_virtual_loss(0);
        tree.backpropagate(&[(root, 0), (child, 0)], Some(leaf), 1.0, 0.5);

        let leaf_stats = tree.get(leaf).snapshot();
        assert_eq!(leaf_stats.visit_count, 1);
        assert!((leaf_stats.value_sum - 1.0).abs() < 1e-6);

        let child_stats = tree.get(child).snapshot();
        assert!((child_stats.edges[0].value_sum - 0.5).abs() < 1e-6);
        assert_eq!(child_stats.virtual_visits, 0);

        let root_stats = tree.get(root).snapshot();
        assert_eq!(root_stats.visit_count, 1);
        assert!((root_stats.edges[0].value_sum - 0.25).abs() < 1e-6);
        assert_eq!(root_stats.edges[0].virtual_loss, 0);
    }

    #[test]
    fn test_remove_virtual_loss() {
        let tree = MctsTree::new(Position::new(0u8), None);
        let root = tree.root();
        expand(&tree, root, &[0.5, 0.5]);
        tree.get(root).lock().add_virtual_loss(1);
        tree.remove_virtual_loss(&[(root, 1)]);
        let stats = tree.get(root).snapshot();
        assert_eq!(stats.virtual_visits, 0);
        assert_eq!(stats.visit_count, 0);
    }

    #[test]
    fn test_root_policy_falls_back_to_priors() {
        let tree = MctsTree::new(Position::new(0u8), None);
        expand(&tree, tree.root(), &[0.1, 0.6, 0.3]);
        assert_eq!(tree.root_policy(3), vec![0.1, 0.6, 0.3]);
        assert_eq!(tree.best_action(), Some(1));
    }

    #[test]
    fn test_root_policy_from_visits() {
        let tree = MctsTree::new(Position::new(0u8), None);
        let root = tree.root();
        expand(&tree, root, &[0.5, 0.5]);
        {
            let node = tree.get(root);
            let mut stats = node.lock();
            stats.edges[0].visit_count = 1;
            stats.edges[1].visit_count = 3;
        }
        let policy = tree.root_policy(2);
        assert!((policy[0] - 0.25).abs() < 1e-6);
        assert!((policy[1] - 0.75).abs() < 1e-6);
        assert_eq!(tree.best_action(), Some(1));
        assert_eq!(tree.root_visits(2), vec![1, 3]);
    }

    #[test]
    fn test_best_action_ties_go_low() {
        let tree = MctsTree::new(Position::new(0u8), None);
        expand(&tree, tree.root(), &[0.5, 0.5, 0.5]);
        assert_eq!(tree.best_action(), Some(0));
    }

    #[test]
    fn test_proven_action() {
        let tree = MctsTree::new(Position::new(3u8), None);
        let root = tree.root();
        expand(&tree, root, &[0.5, 0.5]);
        let open = tree.allocate(Position::new(4), 1, None);
        let solved = tree.allocate(Position::new(0), 1, Some(1.0));
        {
            let node = tree.get(root);
            let mut stats = node.lock();
            stats.edges[0].child = open;
            stats.edges[1].child = solved;
        }
        assert_eq!(tree.proven_action(), Some(1));
    }

    #[test]
    fn test_tree_stats() {
        let tree = MctsTree::new(Position::new(0u8), None);
        tree.allocate(Position::new(1), 1, None);
        tree.allocate(Position::new(2), 2, None);
        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.max_depth, 2);
    }
}
