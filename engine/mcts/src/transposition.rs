//! Transposition table: one search node per distinct state.
//!
//! Maps a state key to the arena node that represents it, so every path that
//! reaches the same state shares visit statistics. Lookup and creation happen
//! under one lock, which makes concurrent creation races resolve to a single
//! node. The table lives for one search; it is dropped with the tree.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::node::NodeId;

/// Transposition table keyed by state.
#[derive(Debug)]
pub struct TranspositionTable<K> {
    entries: Mutex<HashMap<K, NodeId>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash> Default for TranspositionTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> TranspositionTable<K> {
    /// Create a new empty transposition table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Node for `key`, calling `create` only if no node exists yet.
    ///
    /// Returns the node and whether this call created it.
    pub fn get_or_create(&self, key: K, create: impl FnOnce() -> NodeId) -> (NodeId, bool) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (id, false);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let id = create();
        entries.insert(key, id);
        (id, true)
    }

    /// Register a node created elsewhere (the search root).
    pub fn insert(&self, key: K, id: NodeId) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, id);
    }

    pub fn get(&self, key: &K) -> Option<NodeId> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get (hits, misses) statistics.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
