//! Sharded store with native per-key locks.
//!
//! ## Architecture
//!
//! ```text
//!   key ──► map_selector ──► shards[i]: RwLock<FxHashMap<K, Arc<V>>>
//!    │
//!    └───► lock_selector ──► lock_table[j]: Mutex<FxHashMap<K, KeyLockSlot>>
//!                                                    │
//!                                   KeyLockSlot { lock: Arc<RawRwLock>, holders }
//! ```
//!
//! - Entries are spread over `shards` independently locked maps.
//! - Every key being locked owns its own raw reader/writer lock, so distinct
//!   keys never contend, and one thread may hold locks on several keys.
//! - `holders` counts threads holding or waiting for the key's lock. It only
//!   changes under the table shard's mutex, and the slot is erased when it
//!   drops to zero, so the table holds entries only for keys in use.
//! - Raw locks are taken by one call and released by another, so they can
//!   back an acquire/release style API rather than a guard.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cachelock::store::sharded::ShardedStore;
//! use cachelock::store::traits::{CacheStore, KeyLockingStore, MapStore};
//!
//! let store: ShardedStore<&str, u32> = ShardedStore::new(4, 16);
//! store.put("a", Arc::new(1));
//! assert_eq!(store.len(), 1);
//!
//! store.acquire_write_lock_on_key(&"a");
//! assert!(!store.try_read_lock_on_key(&"a", Duration::from_millis(1)));
//! assert!(store.try_write_lock_on_key(&"b", Duration::from_millis(1)));
//! unsafe {
//!     store.release_write_lock_on_key(&"a");
//!     store.release_write_lock_on_key(&"b");
//! }
//! assert_eq!(store.locked_key_count(), 0);
//! ```
//!
//! ## Thread Safety
//! - `ShardedStore` is `Send + Sync` when `K` and `V` are.
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::{RawRwLock as _, RawRwLockTimed as _};
use parking_lot::{Mutex, RawRwLock, RwLock};
use rustc_hash::FxHashMap;

use crate::ds::ShardSelector;
use crate::store::traits::{CacheStore, KeyLockingStore, MapStore, StoreCounters, StoreMetrics};

const MAP_SEED: u64 = 0x5eed_0001;
const LOCK_SEED: u64 = 0x5eed_0002;

struct KeyLockSlot {
    lock: Arc<RawRwLock>,
    holders: usize,
}

type LockTableShard<K> = Mutex<FxHashMap<K, KeyLockSlot>>;

/// Sharded map store exposing native per-key read/write locks.
pub struct ShardedStore<K, V> {
    shards: Box<[RwLock<FxHashMap<K, Arc<V>>>]>,
    map_selector: ShardSelector,
    lock_table: Box<[LockTableShard<K>]>,
    lock_selector: ShardSelector,
    counters: StoreCounters,
}

impl<K, V> ShardedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a store with `shards` map shards and `lock_shards` lock table
    /// shards.
    ///
    /// Both counts are clamped to at least 1.
    pub fn new(shards: usize, lock_shards: usize) -> Self {
        let map_selector = ShardSelector::new(shards, MAP_SEED);
        let lock_selector = ShardSelector::new(lock_shards, LOCK_SEED);
        let shards = (0..map_selector.shard_count())
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        let lock_table = (0..lock_selector.shard_count())
            .map(|_| Mutex::new(FxHashMap::default()))
            .collect();
        Self {
            shards,
            map_selector,
            lock_table,
            lock_selector,
            counters: StoreCounters::default(),
        }
    }

    /// Return the number of map shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Return the number of lock table shards.
    pub fn lock_shard_count(&self) -> usize {
        self.lock_table.len()
    }

    /// Number of keys whose lock is currently held or waited for.
    pub fn locked_key_count(&self) -> usize {
        self.lock_table.iter().map(|t| t.lock().len()).sum()
    }

    fn shard(&self, key: &K) -> &RwLock<FxHashMap<K, Arc<V>>> {
        &self.shards[self.map_selector.shard_for_key(key)]
    }

    fn lock_shard(&self, key: &K) -> &LockTableShard<K> {
        &self.lock_table[self.lock_selector.shard_for_key(key)]
    }

    /// Register the caller as a holder of `key`'s lock and return the lock.
    fn pin(&self, key: &K) -> Arc<RawRwLock> {
        let mut table = self.lock_shard(key).lock();
        let slot = table.entry(key.clone()).or_insert_with(|| KeyLockSlot {
            lock: Arc::new(RawRwLock::INIT),
            holders: 0,
        });
        slot.holders += 1;
        Arc::clone(&slot.lock)
    }

    /// Run `release` on `key`'s lock, drop the caller's registration, and
    /// erase the slot if nobody else holds or waits for it.
    fn unpin(&self, key: &K, release: impl FnOnce(&RawRwLock)) {
        let mut table = self.lock_shard(key).lock();
        // Always present: the caller's own pin keeps the slot alive.
        let Some(slot) = table.get_mut(key) else {
            return;
        };
        release(slot.lock.as_ref());
        slot.holders -= 1;
        if slot.holders == 0 {
            table.remove(key);
        }
    }

    fn try_pinned(&self, key: &K, attempt: impl FnOnce(&RawRwLock) -> bool) -> bool {
        let lock = self.pin(key);
        if attempt(lock.as_ref()) {
            true
        } else {
            self.unpin(key, |_| {});
            false
        }
    }
}

impl<K, V> fmt::Debug for ShardedStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shards", &self.shards.len())
            .field("lock_shards", &self.lock_table.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheStore<K, V> for ShardedStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.shard(key).read().get(key).cloned();
        self.counters.record_lookup(found)
    }

    fn put(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let previous = self.shard(&key).write().insert(key, value);
        self.counters.record_put(previous.is_some());
        previous
    }

    fn remove(&self, key: &K) -> Option<Arc<V>> {
        let removed = self.shard(key).write().remove(key);
        if removed.is_some() {
            self.counters.record_removes(1);
        }
        removed
    }

    /// Clears every shard while holding all shard locks, so no reader sees a
    /// partially cleared store.
    fn clear(&self) {
        let mut guards: Vec<_> = self.shards.iter().map(|s| s.write()).collect();
        for guard in guards.iter_mut() {
            guard.clear();
        }
    }

    fn metrics(&self) -> StoreMetrics {
        self.counters.snapshot()
    }
}

impl<K, V> MapStore<K, V> for ShardedStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    fn contains(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            keys.extend(shard.read().keys().cloned());
        }
        keys
    }

    /// Each shard is filtered under its own write lock.
    fn remove_if(&self, predicate: &mut dyn FnMut(&K) -> bool) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut map = shard.write();
            let before = map.len();
            map.retain(|k, _| !predicate(k));
            removed += before - map.len();
        }
        self.counters.record_removes(removed as u64);
        removed
    }
}

impl<K, V> KeyLockingStore<K> for ShardedStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn acquire_read_lock_on_key(&self, key: &K) {
        self.pin(key).lock_shared();
    }

    fn acquire_write_lock_on_key(&self, key: &K) {
        self.pin(key).lock_exclusive();
    }

    fn try_read_lock_on_key(&self, key: &K, timeout: Duration) -> bool {
        self.try_pinned(key, |lock| lock.try_lock_shared_for(timeout))
    }

    fn try_write_lock_on_key(&self, key: &K, timeout: Duration) -> bool {
        self.try_pinned(key, |lock| lock.try_lock_exclusive_for(timeout))
    }

    unsafe fn release_read_lock_on_key(&self, key: &K) {
        // SAFETY: the caller holds a shared lock on this key, which keeps its
        // slot pinned and its lock the one that was locked.
        self.unpin(key, |lock| unsafe { lock.unlock_shared() });
    }

    unsafe fn release_write_lock_on_key(&self, key: &K) {
        // SAFETY: the caller holds the exclusive lock on this key, which keeps
        // its slot pinned and its lock the one that was locked.
        self.unpin(key, |lock| unsafe { lock.unlock_exclusive() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn sharded_store_basic_ops() {
        let store = ShardedStore::new(4, 16);
        let value = Arc::new("v1".to_string());
        assert_eq!(store.put("k1", value.clone()), None);
        assert_eq!(store.get(&"k1"), Some(value.clone()));
        assert!(store.contains(&"k1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&"k1"), Some(value));
        assert!(!store.contains(&"k1"));
    }

    #[test]
    fn counts_are_clamped() {
        let store: ShardedStore<u32, u32> = ShardedStore::new(0, 0);
        assert_eq!(store.shard_count(), 1);
        assert_eq!(store.lock_shard_count(), 1);
    }

    #[test]
    fn len_and_keys_span_all_shards() {
        let store = ShardedStore::new(8, 8);
        for i in 0..100u32 {
            store.put(i, Arc::new(i));
        }
        assert_eq!(store.len(), 100);
        let mut keys = store.keys();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn remove_if_filters_every_shard() {
        let store = ShardedStore::new(8, 8);
        for i in 0..40u32 {
            store.put(i, Arc::new(i));
        }
        assert_eq!(store.remove_if(&mut |k| k % 4 == 0), 10);
        assert_eq!(store.len(), 30);
        assert!(!store.contains(&8));
        assert_eq!(store.metrics().removes, 10);
    }

    #[test]
    fn shared_locks_coexist_exclusive_does_not() {
        let store: ShardedStore<&str, ()> = ShardedStore::new(1, 4);
        let short = Duration::from_millis(5);

        store.acquire_read_lock_on_key(&"k");
        assert!(store.try_read_lock_on_key(&"k", short));
        assert!(!store.try_write_lock_on_key(&"k", short));
        unsafe {
            store.release_read_lock_on_key(&"k");
            store.release_read_lock_on_key(&"k");
        }

        assert!(store.try_write_lock_on_key(&"k", short));
        assert!(!store.try_read_lock_on_key(&"k", short));
        unsafe { store.release_write_lock_on_key(&"k") };
        assert!(store.try_read_lock_on_key(&"k", short));
        unsafe { store.release_read_lock_on_key(&"k") };
        assert_eq!(store.locked_key_count(), 0);
    }

    #[test]
    fn distinct_keys_never_contend_even_in_one_table_shard() {
        let store: ShardedStore<u32, ()> = ShardedStore::new(1, 1);
        store.acquire_write_lock_on_key(&0);
        for key in 1..1_000u32 {
            assert!(
                store.try_write_lock_on_key(&key, Duration::ZERO),
                "key {key} contended with key 0"
            );
        }
        assert_eq!(store.locked_key_count(), 1_000);
        for key in 0..1_000u32 {
            unsafe { store.release_write_lock_on_key(&key) };
        }
        assert_eq!(store.locked_key_count(), 0);
    }

    #[test]
    fn one_thread_can_hold_several_keys() {
        let store: ShardedStore<u32, ()> = ShardedStore::new(1, 1);
        store.acquire_write_lock_on_key(&1);
        // Would never return if both keys shared one lock.
        store.acquire_read_lock_on_key(&2);
        store.acquire_write_lock_on_key(&3);
        unsafe {
            store.release_write_lock_on_key(&3);
            store.release_read_lock_on_key(&2);
            store.release_write_lock_on_key(&1);
        }
        assert_eq!(store.locked_key_count(), 0);
    }

    #[test]
    fn failed_try_leaves_no_slot_behind() {
        let store: ShardedStore<u32, ()> = ShardedStore::new(1, 2);
        store.acquire_write_lock_on_key(&7);
        assert!(!store.try_read_lock_on_key(&7, Duration::from_millis(2)));
        assert_eq!(store.locked_key_count(), 1);
        unsafe { store.release_write_lock_on_key(&7) };
        assert_eq!(store.locked_key_count(), 0);
    }

    #[test]
    fn waiter_keeps_slot_alive_across_release() {
        let store: Arc<ShardedStore<u32, ()>> = Arc::new(ShardedStore::new(1, 2));
        store.acquire_write_lock_on_key(&5);

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let store = store.clone();
            thread::spawn(move || {
                store.acquire_write_lock_on_key(&5);
                tx.send(()).unwrap();
                unsafe { store.release_write_lock_on_key(&5) };
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        unsafe { store.release_write_lock_on_key(&5) };
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(store.locked_key_count(), 0);
    }
}
