//! Key locks for backends without native per-key locking.
//!
//! ## Architecture
//!
//! ```text
//!   LockRegistry<K>
//!   Mutex<FxHashMap<CacheId, CacheLocks>>          held only to look up or
//!        │                                          insert/remove an entry
//!        ├── CacheId #1 ─► CacheLocks { cache: Weak<CacheIdentity>,
//!        │                              keys: FxHashMap<K, RegisteredLock> }
//!        │                                   ├── "a" ─► { lock, users: 2 }
//!        │                                   └── "b" ─► { lock, users: 1 }
//!        └── CacheId #2 ─► ...
//!
//!   LockAcquisition ── Arc<KeyRwLock> + Arc<CacheIdentity> + K
//! ```
//!
//! `users` counts the acquisitions and waiting threads of a (cache, key)
//! pair. It is only changed under the registry mutex: `entry_for` adds one,
//! `reclaim` removes one. So:
//!
//! - while any user is outstanding every caller for the same (cache, key)
//!   meets the same lock;
//! - when the last user reclaims, the entry is erased, and the per-cache map
//!   goes with it once empty.
//!
//! Other clones of the lock's `Arc` (an interrupt token that last parked on
//! it, for instance) never keep an entry alive.
//!
//! The registry mutex is never held while waiting for a key lock.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use cachelock::cache::Cache;
//! use cachelock::lock::KeyLocks;
//! use cachelock::store::hashmap::ConcurrentHashMapStore;
//!
//! let cache: Cache<String, u64> =
//!     Cache::plain_map("reports", Arc::new(ConcurrentHashMapStore::new(16)));
//! let locks = KeyLocks::new();
//!
//! let held = locks.acquire_write_lock(&cache, "ee:42".to_string());
//! assert!(locks.registry().is_registered(&cache, &"ee:42".to_string()));
//! drop(held);
//! assert!(!locks.registry().is_registered(&cache, &"ee:42".to_string()));
//! ```

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::cache::{Cache, CacheId, CacheIdentity};
use crate::error::LockError;
use crate::lock::acquisition::{Hold, LockAcquisition};
use crate::lock::interrupt::Interrupt;
use crate::lock::rw::KeyRwLock;
use crate::lock::{KeyLock, LockKey};

struct RegisteredLock {
    lock: Arc<KeyRwLock>,
    users: usize,
}

struct CacheLocks<K> {
    cache: Weak<CacheIdentity>,
    keys: FxHashMap<K, RegisteredLock>,
}

/// Two-level registry of fallback key locks: cache, then key.
pub struct LockRegistry<K> {
    caches: Mutex<FxHashMap<CacheId, CacheLocks<K>>>,
}

impl<K> Default for LockRegistry<K> {
    fn default() -> Self {
        Self {
            caches: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<K> fmt::Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caches = self.caches.lock();
        f.debug_struct("LockRegistry")
            .field("caches", &caches.len())
            .field("keys", &caches.values().map(|c| c.keys.len()).sum::<usize>())
            .finish()
    }
}

impl<K: LockKey> LockRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more user of the lock for (`cache`, `key`), creating it
    /// if absent, and return the lock.
    ///
    /// Every call must be paired with exactly one [`reclaim`](Self::reclaim).
    pub(crate) fn entry_for(&self, cache: &Arc<CacheIdentity>, key: &K) -> Arc<KeyRwLock> {
        let mut caches = self.caches.lock();
        if !caches.contains_key(&cache.id()) {
            caches.retain(|_, locks| locks.cache.strong_count() > 0);
        }
        let locks = caches.entry(cache.id()).or_insert_with(|| CacheLocks {
            cache: Arc::downgrade(cache),
            keys: FxHashMap::default(),
        });

        let registered = match locks.keys.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::trace!(cache = %cache.name(), "registered fallback key lock");
                entry.insert(RegisteredLock {
                    lock: Arc::new(KeyRwLock::new()),
                    users: 0,
                })
            },
        };
        registered.users += 1;
        Arc::clone(&registered.lock)
    }

    /// Drop one user of the lock for (`cache`, `key`) and erase the entry if
    /// it was the last.
    pub(crate) fn reclaim(&self, cache: CacheId, key: &K, entry: Arc<KeyRwLock>) {
        let mut caches = self.caches.lock();
        let Entry::Occupied(mut locks) = caches.entry(cache) else {
            return;
        };
        if let Entry::Occupied(mut registered) = locks.get_mut().keys.entry(key.clone()) {
            debug_assert!(Arc::ptr_eq(&registered.get().lock, &entry));
            registered.get_mut().users -= 1;
            if registered.get().users == 0 {
                registered.remove();
                tracing::trace!(cache = %cache, "reclaimed fallback key lock");
            }
        }
        if locks.get().keys.is_empty() {
            locks.remove();
        }
    }

    /// Whether a lock is registered for (`cache`, `key`).
    pub fn is_registered<V>(&self, cache: &Cache<K, V>, key: &K) -> bool {
        self.caches
            .lock()
            .get(&cache.id())
            .is_some_and(|locks| locks.keys.contains_key(key))
    }

    /// Number of registered key locks across all caches.
    pub fn len(&self) -> usize {
        self.caches.lock().values().map(|locks| locks.keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of caches with at least one registered key lock.
    pub fn cache_count(&self) -> usize {
        self.caches.lock().len()
    }

    /// Erase the entries of caches whose every handle has been dropped,
    /// returning how many key entries were removed.
    ///
    /// Acquisitions keep their cache alive, so entries only linger here if an
    /// acquisition was leaked.
    pub fn purge(&self) -> usize {
        let mut caches = self.caches.lock();
        let mut removed = 0;
        caches.retain(|_, locks| {
            let live = locks.cache.strong_count() > 0;
            if !live {
                removed += locks.keys.len();
            }
            live && !locks.keys.is_empty()
        });
        removed
    }
}

/// Key lock backed by the registry.
pub struct FallbackKeyLock<K: LockKey> {
    registry: Arc<LockRegistry<K>>,
    cache: Arc<CacheIdentity>,
    key: K,
    read_only: bool,
}

impl<K: LockKey> FallbackKeyLock<K> {
    pub(crate) fn new(
        registry: Arc<LockRegistry<K>>,
        cache: Arc<CacheIdentity>,
        key: K,
        read_only: bool,
    ) -> Self {
        Self {
            registry,
            cache,
            key,
            read_only,
        }
    }

    fn acquired(&self, entry: Arc<KeyRwLock>) -> LockAcquisition<K> {
        LockAcquisition::new(
            self.key.clone(),
            self.read_only,
            Hold::Fallback {
                entry,
                registry: Arc::clone(&self.registry),
                cache: Arc::clone(&self.cache),
            },
        )
    }
}

impl<K: LockKey> KeyLock<K> for FallbackKeyLock<K> {
    fn key(&self) -> &K {
        &self.key
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn lock(&self) -> LockAcquisition<K> {
        let entry = self.registry.entry_for(&self.cache, &self.key);
        if self.read_only {
            entry.read();
        } else {
            entry.write();
        }
        self.acquired(entry)
    }

    fn lock_interruptibly(&self, interrupt: &Interrupt) -> Result<LockAcquisition<K>, LockError> {
        let entry = self.registry.entry_for(&self.cache, &self.key);
        let waited = if self.read_only {
            entry.read_interruptibly(interrupt)
        } else {
            entry.write_interruptibly(interrupt)
        };
        match waited {
            Ok(()) => Ok(self.acquired(entry)),
            Err(err) => {
                tracing::debug!(
                    cache = %self.cache.name(),
                    read_only = self.read_only,
                    "interrupted while waiting for fallback key lock"
                );
                self.registry.reclaim(self.cache.id(), &self.key, entry);
                Err(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::KeyLocks;
    use crate::store::bounded::BoundedFifoStore;
    use crate::store::hashmap::ConcurrentHashMapStore;

    fn plain(name: &str) -> Cache<&'static str, u32> {
        Cache::plain_map(name, Arc::new(ConcurrentHashMapStore::new(4)))
    }

    fn fallback_entry<K: LockKey>(held: &LockAcquisition<K>) -> Weak<KeyRwLock> {
        match held.hold_for_test() {
            Some(Hold::Fallback { entry, .. }) => Arc::downgrade(entry),
            _ => panic!("expected fallback hold"),
        }
    }

    #[test]
    fn same_pair_resolves_to_same_lock_while_held() {
        let registry = LockRegistry::new();
        let cache = plain("c");
        let a = registry.entry_for(cache.identity(), &"k");
        let b = registry.entry_for(cache.identity(), &"k");
        assert!(Arc::ptr_eq(&a, &b));
        registry.reclaim(cache.id(), &"k", a);
        assert!(registry.is_registered(&cache, &"k"));
        registry.reclaim(cache.id(), &"k", b);
        assert!(!registry.is_registered(&cache, &"k"));
        assert_eq!(registry.cache_count(), 0);
    }

    #[test]
    fn distinct_pairs_never_share() {
        let registry = LockRegistry::new();
        let c1 = plain("c1");
        let c2 = plain("c2");
        let k1 = registry.entry_for(c1.identity(), &"k");
        let k2 = registry.entry_for(c1.identity(), &"other");
        let k3 = registry.entry_for(c2.identity(), &"k");
        assert!(!Arc::ptr_eq(&k1, &k2));
        assert!(!Arc::ptr_eq(&k1, &k3));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.cache_count(), 2);
    }

    #[test]
    fn released_entry_is_reclaimed() {
        let locks = KeyLocks::new();
        let cache = plain("c");

        let held = locks.acquire_read_lock(&cache, "k");
        let weak = fallback_entry(&held);
        assert!(weak.upgrade().is_some());

        drop(held);
        assert!(weak.upgrade().is_none());
        assert!(locks.registry().is_empty());
    }

    #[test]
    fn held_entry_survives_other_releases() {
        let locks = KeyLocks::new();
        let cache = plain("c");

        let first = locks.acquire_read_lock(&cache, "k");
        let second = locks.acquire_read_lock(&cache, "k");
        let weak = fallback_entry(&first);
        drop(first);
        assert!(locks.registry().is_registered(&cache, &"k"));

        // A later reader must meet the same lock as the outstanding one.
        let third = locks.acquire_read_lock(&cache, "k");
        let live = weak.upgrade().expect("entry held by second reader");
        assert!(Arc::ptr_eq(&live, &fallback_entry(&third).upgrade().unwrap()));
        assert_eq!(live.reader_count(), 2);
        drop(live);

        drop(second);
        drop(third);
        assert!(locks.registry().is_empty());
    }

    #[test]
    fn interrupted_wait_leaves_no_entry() {
        let locks = KeyLocks::new();
        let cache: Cache<&str, u32> =
            Cache::opaque("opaque", Arc::new(BoundedFifoStore::new(4)));
        let interrupt = Interrupt::new();
        interrupt.interrupt();
        let result = locks.acquire_write_lock_interruptibly(&cache, "k", &interrupt);
        assert_eq!(result.err(), Some(LockError::Interrupted));
        assert!(locks.registry().is_empty());
    }

    #[test]
    fn purge_drops_entries_of_dead_caches() {
        let registry = LockRegistry::new();
        let cache = plain("short-lived");
        let entry = registry.entry_for(cache.identity(), &"k");
        std::mem::forget(entry);
        drop(cache);
        assert_eq!(registry.cache_count(), 1);
        assert_eq!(registry.purge(), 1);
        assert_eq!(registry.cache_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn purge_keeps_entries_of_live_caches() {
        let locks = KeyLocks::new();
        let cache = plain("c");
        let _held = locks.acquire_write_lock(&cache, "k");
        assert_eq!(locks.registry().purge(), 0);
        assert!(locks.registry().is_registered(&cache, &"k"));
    }

    #[test]
    fn outside_clone_of_lock_does_not_pin_entry() {
        let locks = KeyLocks::new();
        let cache = plain("c");

        let held = locks.acquire_write_lock(&cache, "k");
        let stray = fallback_entry(&held).upgrade().unwrap();
        drop(held);

        assert!(!locks.registry().is_registered(&cache, &"k"));
        assert_eq!(locks.registry().cache_count(), 0);
        assert_eq!(locks.registry().purge(), 0);

        // A new acquisition gets a fresh lock, not the stray one.
        let again = locks.acquire_write_lock(&cache, "k");
        assert!(!Arc::ptr_eq(&stray, &fallback_entry(&again).upgrade().unwrap()));
        drop(again);
        assert!(locks.registry().is_empty());
    }

    #[test]
    fn interrupt_racing_release_leaves_registry_empty() {
        let locks = KeyLocks::new();
        let cache = plain("c");

        for _ in 0..200 {
            let held = locks.acquire_write_lock(&cache, "k");
            let interrupt = Interrupt::new();
            let waiter = {
                let locks = locks.clone();
                let cache = cache.clone();
                let interrupt = interrupt.clone();
                std::thread::spawn(move || {
                    locks
                        .acquire_read_lock_interruptibly(&cache, "k", &interrupt)
                        .map(drop)
                })
            };
            std::thread::yield_now();
            interrupt.interrupt();
            drop(held);
            let _ = waiter.join().unwrap();
            drop(interrupt);

            assert_eq!(locks.registry().purge(), 0);
            assert!(locks.registry().is_empty());
            assert_eq!(locks.registry().cache_count(), 0);
        }
    }
}
