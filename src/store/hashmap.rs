//! HashMap-backed plain-map store.
//!
//! ## Architecture
//! - Entries live in one `FxHashMap<K, Arc<V>>` behind a `parking_lot::RwLock`.
//! - Reads (`get`, `contains`, `len`, `keys`) share the lock; writes take it
//!   exclusively.
//! - No per-key locking: caches built on this store use the fallback lock
//!   registry for key locks.
//!
//! ## Example Usage
//! ```rust
//! use std::sync::Arc;
//!
//! use cachelock::store::hashmap::ConcurrentHashMapStore;
//! use cachelock::store::traits::{CacheStore, MapStore};
//!
//! let store: ConcurrentHashMapStore<u64, String> = ConcurrentHashMapStore::new(16);
//! store.put(1, Arc::new("a".to_string()));
//! assert!(store.contains(&1));
//! assert_eq!(store.keys(), vec![1]);
//! ```
//!
//! ## Thread Safety
//! - `ConcurrentHashMapStore` is `Send + Sync` when `K` and `V` are.
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::store::traits::{CacheStore, MapStore, StoreCounters, StoreMetrics};

/// Concurrent HashMap-backed store using interior mutability.
#[derive(Debug)]
pub struct ConcurrentHashMapStore<K, V> {
    map: RwLock<FxHashMap<K, Arc<V>>>,
    counters: StoreCounters,
}

impl<K, V> ConcurrentHashMapStore<K, V>
where
    K: Eq + Hash,
{
    /// Create a store with room for `capacity` entries before reallocating.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
            counters: StoreCounters::default(),
        }
    }
}

impl<K, V> Default for ConcurrentHashMapStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(0)
    }
}

impl<K, V> CacheStore<K, V> for ConcurrentHashMapStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.map.read().get(key).cloned();
        self.counters.record_lookup(found)
    }

    fn put(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let previous = self.map.write().insert(key, value);
        self.counters.record_put(previous.is_some());
        previous
    }

    fn remove(&self, key: &K) -> Option<Arc<V>> {
        let removed = self.map.write().remove(key);
        if removed.is_some() {
            self.counters.record_removes(1);
        }
        removed
    }

    fn clear(&self) {
        self.map.write().clear();
    }

    fn metrics(&self) -> StoreMetrics {
        self.counters.snapshot()
    }
}

impl<K, V> MapStore<K, V> for ConcurrentHashMapStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn contains(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        self.map.read().keys().cloned().collect()
    }

    /// Runs under a single write lock.
    fn remove_if(&self, predicate: &mut dyn FnMut(&K) -> bool) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|k, _| !predicate(k));
        let removed = before - map.len();
        self.counters.record_removes(removed as u64);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashmap_store_basic_ops() {
        let store = ConcurrentHashMapStore::new(2);
        let value = Arc::new("v1".to_string());
        assert_eq!(store.put("k1", value.clone()), None);
        assert_eq!(store.get(&"k1"), Some(value.clone()));
        assert!(store.contains(&"k1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&"k1"), Some(value));
        assert!(!store.contains(&"k1"));
        assert!(store.is_empty());
    }

    #[test]
    fn hashmap_store_keys_snapshot() {
        let store = ConcurrentHashMapStore::new(4);
        for k in ["a", "b", "c"] {
            store.put(k, Arc::new(0u8));
        }
        let mut keys = store.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn hashmap_store_remove_if_counts_removed() {
        let store = ConcurrentHashMapStore::new(8);
        for i in 0..6u32 {
            store.put(i, Arc::new(i));
        }
        assert_eq!(store.remove_if(&mut |k| k % 2 == 1), 3);
        assert_eq!(store.len(), 3);
        assert!(store.contains(&4));
        assert!(!store.contains(&5));
        assert_eq!(store.metrics().removes, 3);
    }

    #[test]
    fn hashmap_store_metrics_counts() {
        let store = ConcurrentHashMapStore::new(2);
        let value = Arc::new("v1".to_string());

        assert_eq!(store.metrics(), StoreMetrics::default());
        assert_eq!(store.get(&"missing"), None);
        assert_eq!(store.put("k1", value.clone()), None);
        assert_eq!(store.put("k1", value.clone()), Some(value.clone()));
        assert_eq!(store.get(&"k1"), Some(value.clone()));
        assert_eq!(store.remove(&"k1"), Some(value));

        let metrics = store.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.inserts, 1);
        assert_eq!(metrics.updates, 1);
        assert_eq!(metrics.removes, 1);
    }
}
