//! Storage backends behind a [`Cache`](crate::cache::Cache) handle.
//!
//! Backends differ in how much they let callers see. Every backend can get,
//! put, remove and clear ([`CacheStore`]). Map-like backends can additionally
//! report their size and enumerate keys ([`MapStore`]). Rich backends also
//! expose per-key read/write locks ([`KeyLockingStore`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of store-level metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
}

/// Atomic counters shared by the concurrent stores in this module.
#[derive(Debug, Default)]
pub(crate) struct StoreCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
}

impl StoreCounters {
    pub(crate) fn snapshot(&self) -> StoreMetrics {
        StoreMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
        }
    }

    /// Count a lookup result and pass it through.
    pub(crate) fn record_lookup<T>(&self, found: Option<T>) -> Option<T> {
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Count an insert or update depending on whether a value was replaced.
    pub(crate) fn record_put(&self, replaced: bool) {
        if replaced {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_removes(&self, count: u64) {
        if count > 0 {
            self.removes.fetch_add(count, Ordering::Relaxed);
        }
    }
}

/// Operations every backend supports.
///
/// All methods take `&self`: backends are shared between threads and use
/// interior mutability.
pub trait CacheStore<K, V>: Send + Sync {
    /// Fetch a value by key.
    fn get(&self, key: &K) -> Option<Arc<V>>;

    /// Insert or replace a value. Returns the previous value if present.
    fn put(&self, key: K, value: Arc<V>) -> Option<Arc<V>>;

    /// Remove a value by key.
    fn remove(&self, key: &K) -> Option<Arc<V>>;

    /// Remove all entries.
    fn clear(&self);

    /// Snapshot the store's current metrics.
    fn metrics(&self) -> StoreMetrics {
        StoreMetrics::default()
    }
}

/// Backends that can report their size and enumerate their keys.
pub trait MapStore<K, V>: CacheStore<K, V> {
    /// Current number of entries.
    fn len(&self) -> usize;

    /// Check if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a key exists.
    fn contains(&self, key: &K) -> bool;

    /// Snapshot of all keys currently stored.
    fn keys(&self) -> Vec<K>;

    /// Remove every entry whose key matches `predicate` and return how many
    /// were removed.
    ///
    /// `predicate` runs while the store holds its write lock and must not
    /// call back into the store.
    fn remove_if(&self, predicate: &mut dyn FnMut(&K) -> bool) -> usize;
}

/// Backends with a built-in per-key read/write lock.
///
/// The interface is acquire/release rather than guard based: a lock taken by
/// one call is released by a later, separate call. Locks on distinct keys
/// are independent: one thread may hold several at once.
pub trait KeyLockingStore<K>: Send + Sync {
    /// Block until a shared lock on `key` is held.
    fn acquire_read_lock_on_key(&self, key: &K);

    /// Block until an exclusive lock on `key` is held.
    fn acquire_write_lock_on_key(&self, key: &K);

    /// Try to take a shared lock on `key`, waiting at most `timeout`.
    fn try_read_lock_on_key(&self, key: &K, timeout: Duration) -> bool;

    /// Try to take an exclusive lock on `key`, waiting at most `timeout`.
    fn try_write_lock_on_key(&self, key: &K, timeout: Duration) -> bool;

    /// Release a shared lock on `key`.
    ///
    /// # Safety
    ///
    /// The caller must hold a shared lock on `key` taken from this store, and
    /// must release it exactly once.
    unsafe fn release_read_lock_on_key(&self, key: &K);

    /// Release an exclusive lock on `key`.
    ///
    /// # Safety
    ///
    /// The caller must hold the exclusive lock on `key` taken from this store,
    /// and must release it exactly once.
    unsafe fn release_write_lock_on_key(&self, key: &K);
}
