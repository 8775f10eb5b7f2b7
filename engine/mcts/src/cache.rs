//! Evaluation cache: bounded LRU map from canonical state to oracle output.
//!
//! Entries are immutable once inserted and valid for the lifetime of one
//! model snapshot; a new snapshot gets a new cache. The cache only makes
//! sense when the oracle sees the current state alone, so it is constructed
//! disabled when positions carry history.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::evaluator::EvalResult;

struct Lru<K> {
    entries: HashMap<K, (Arc<EvalResult>, u64)>,
    /// Last-use tick -> key; the first entry is the eviction candidate.
    recency: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Eq + Hash + Clone> Lru<K> {
    fn touch(&mut self, key: &K) -> Option<Arc<EvalResult>> {
        self.tick += 1;
        let tick = self.tick;
        let (value, last_used) = self.entries.get_mut(key)?;
        self.recency.remove(last_used);
        *last_used = tick;
        self.recency.insert(tick, key.clone());
        Some(Arc::clone(value))
    }

    fn evict_oldest(&mut self) -> bool {
        match self.recency.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Thread-safe LRU evaluation cache.
pub struct EvalCache<K> {
    inner: Option<Mutex<Lru<K>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<K> std::fmt::Debug for EvalCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalCache")
            .field("enabled", &self.inner.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K: Eq + Hash + Clone> EvalCache<K> {
    /// Enabled cache holding at most `capacity` entries. A zero capacity
    /// yields a disabled cache.
    pub fn new(capacity: usize) -> Self {
        let inner = (capacity > 0).then(|| {
            Mutex::new(Lru {
                entries: HashMap::with_capacity(capacity.min(1 << 16)),
                recency: BTreeMap::new(),
                tick: 0,
            })
        });
        Self {
            inner,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache that never stores anything; every lookup misses.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry for `key`, marking it most recently used.
    pub fn lookup(&self, key: &K) -> Option<Arc<EvalResult>> {
        let Some(inner) = &self.inner else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let found = inner.lock().unwrap_or_else(|e| e.into_inner()).touch(key);
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store an entry. An existing entry for `key` is kept as is, so
    /// concurrent inserts of the same key are harmless.
    pub fn insert(&self, key: K, value: EvalResult) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut lru = inner.lock().unwrap_or_else(|e| e.into_inner());
        if lru.touch(&key).is_some() {
            return;
        }
        while lru.entries.len() >= self.capacity {
            if !lru.evict_oldest() {
                break;
            }
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        lru.tick += 1;
        let tick = lru.tick;
        lru.recency.insert(tick, key.clone());
        lru.entries.insert(key, (Arc::new(value), tick));
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|e| e.into_inner()).entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(value: f32) -> EvalResult {
        EvalResult {
            policy: vec![0.5, 0.5],
            value,
        }
    }

    #[test]
    fn test_insert_then_lookup() {
        let cache = EvalCache::new(4);
        cache.insert(1u32, result(0.3));
        let hit = cache.lookup(&1).unwrap();
        assert!((hit.value - 0.3).abs() < 1e-6);
        assert!(cache.lookup(&2).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_lookup_is_identical() {
        let cache = EvalCache::new(4);
        cache.insert(9u32, result(0.7));
        let first = cache.lookup(&9).unwrap();
        let second = cache.lookup(&9).unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_second_insert_keeps_first_entry() {
        let cache = EvalCache::new(4);
        cache.insert(1u32, result(0.1));
        cache.insert(1u32, result(0.9));
        assert!((cache.lookup(&1).unwrap().value - 0.1).abs() < 1e-6);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = EvalCache::new(2);
        cache.insert(1u32, result(0.1));
        cache.insert(2u32, result(0.2));
        // Touch 1 so 2 becomes the oldest.
        assert!(cache.lookup(&1).is_some());
        cache.insert(3u32, result(0.3));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&2).is_none());
        assert!(cache.lookup(&1).is_some());
        assert!(cache.lookup(&3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let cache = EvalCache::disabled();
        assert!(!cache.is_enabled());
        cache.insert(1u32, result(0.5));
        assert!(cache.lookup(&1).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(EvalCache::new(64));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        let key = (t * 100 + i) % 80;
                        if cache.lookup(&key).is_none() {
                            cache.insert(key, result(key as f32));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64);
        for key in 0..80u32 {
            if let Some(hit) = cache.lookup(&key) {
                assert_eq!(hit.value, key as f32);
            }
        }
    }
}
