//! Capacity-bounded FIFO store with no introspection.
//!
//! Stands in for backends that only answer point lookups: it can get, put,
//! remove and clear, but deliberately implements neither
//! [`MapStore`](crate::store::traits::MapStore) nor
//! [`KeyLockingStore`](crate::store::traits::KeyLockingStore). Caches built on
//! it report size 0, enumerate no keys, degrade `evict_if` to a full clear,
//! and use the fallback lock registry.
//!
//! When full, inserting a new key evicts the oldest inserted key. Each queue
//! entry carries the insertion sequence number of its key, so entries left
//! behind by `remove` (or by a later re-insert) are skipped on eviction.
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::store::traits::{CacheStore, StoreCounters, StoreMetrics};

#[derive(Debug)]
struct FifoState<K, V> {
    map: FxHashMap<K, (u64, Arc<V>)>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

/// Bounded FIFO store exposing only point operations.
#[derive(Debug)]
pub struct BoundedFifoStore<K, V> {
    state: Mutex<FifoState<K, V>>,
    capacity: usize,
    counters: StoreCounters,
}

impl<K, V> BoundedFifoStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a store holding at most `capacity` entries (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(FifoState {
                map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                order: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
            counters: StoreCounters::default(),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> CacheStore<K, V> for BoundedFifoStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.state.lock().map.get(key).map(|(_, v)| Arc::clone(v));
        self.counters.record_lookup(found)
    }

    fn put(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        if let Some((_, slot)) = state.map.get_mut(&key) {
            let previous = std::mem::replace(slot, value);
            self.counters.record_put(true);
            return Some(previous);
        }

        let FifoState {
            map,
            order,
            next_seq,
        } = &mut *state;
        while map.len() >= self.capacity {
            let Some((seq, oldest)) = order.pop_front() else {
                break;
            };
            if map.get(&oldest).is_some_and(|(live, _)| *live == seq) {
                map.remove(&oldest);
            }
        }
        if order.len() > self.capacity * 2 {
            order.retain(|(seq, k)| map.get(k).is_some_and(|(live, _)| live == seq));
        }

        let seq = *next_seq;
        *next_seq += 1;
        order.push_back((seq, key.clone()));
        map.insert(key, (seq, value));
        self.counters.record_put(false);
        None
    }

    fn remove(&self, key: &K) -> Option<Arc<V>> {
        let removed = self.state.lock().map.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.counters.record_removes(1);
        }
        removed
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.order.clear();
    }

    fn metrics(&self) -> StoreMetrics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_store_basic_ops() {
        let store = BoundedFifoStore::new(4);
        assert_eq!(store.put("a", Arc::new(1)), None);
        assert_eq!(store.put("a", Arc::new(2)), Some(Arc::new(1)));
        assert_eq!(store.get(&"a"), Some(Arc::new(2)));
        assert_eq!(store.remove(&"a"), Some(Arc::new(2)));
        assert_eq!(store.get(&"a"), None);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let store = BoundedFifoStore::new(2);
        store.put(1, Arc::new(1));
        store.put(2, Arc::new(2));
        store.put(3, Arc::new(3));
        assert_eq!(store.get(&1), None);
        assert!(store.get(&2).is_some());
        assert!(store.get(&3).is_some());
    }

    #[test]
    fn removed_keys_do_not_count_against_capacity() {
        let store = BoundedFifoStore::new(2);
        store.put(1, Arc::new(1));
        store.put(2, Arc::new(2));
        store.remove(&1);
        store.put(3, Arc::new(3));
        assert!(store.get(&2).is_some());
        assert!(store.get(&3).is_some());
    }

    #[test]
    fn reinserted_key_is_not_evicted_by_its_stale_entry() {
        let store = BoundedFifoStore::new(2);
        store.put(1, Arc::new(1));
        store.remove(&1);
        store.put(2, Arc::new(2));
        store.put(1, Arc::new(10));
        store.put(3, Arc::new(3));
        assert_eq!(store.get(&1), Some(Arc::new(10)));
        assert_eq!(store.get(&2), None);
        assert!(store.get(&3).is_some());
    }

    #[test]
    fn clear_empties_store() {
        let store = BoundedFifoStore::new(8);
        for i in 0..8 {
            store.put(i, Arc::new(i));
        }
        store.clear();
        assert!((0..8).all(|i| store.get(&i).is_none()));
    }
}
