//! Uniform cache handle over backends of differing capability.
//!
//! ## Architecture
//!
//! ```text
//!                       ┌────────────────────────────┐
//!                       │        Cache<K, V>         │
//!                       │  identity: Arc<Identity>   │  id + name, shared by clones
//!                       │  backend:  Backend<K, V>   │  capability fixed at creation
//!                       └─────────────┬──────────────┘
//!                                     │
//!          ┌──────────────────────────┼──────────────────────────┐
//!          ▼                          ▼                          ▼
//!   Backend::Rich              Backend::PlainMap           Backend::Opaque
//!   MapStore + KeyLockingStore MapStore                    CacheStore
//!   (native key locks)         (fallback key locks)        (fallback key locks)
//! ```
//!
//! ## Capability Matrix
//!
//! | Operation      | Rich            | PlainMap        | Opaque                     |
//! |----------------|-----------------|-----------------|----------------------------|
//! | `size`         | store count     | map len         | `0`                        |
//! | `contains_key` | store lookup    | map lookup      | `get(key).is_some()`       |
//! | `keys`         | full snapshot   | full snapshot   | empty set                  |
//! | `evict_if`     | selective       | selective       | clears the whole cache     |
//!
//! Capability gaps are never errors. `evict_if` on an opaque backend cannot
//! tell which keys exist, so it clears everything rather than risk keeping an
//! entry the predicate would have matched.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use cachelock::cache::{Cache, Capability};
//! use cachelock::store::hashmap::ConcurrentHashMapStore;
//!
//! let cache: Cache<&str, u32> =
//!     Cache::plain_map("stats", Arc::new(ConcurrentHashMapStore::new(8)));
//! assert_eq!(cache.capability(), Capability::PlainMap);
//!
//! for k in ["a", "b", "c"] {
//!     cache.put(k, 1);
//! }
//! cache.evict_if(|k| *k == "b");
//! assert_eq!(cache.size(), 2);
//! assert!(!cache.contains_key(&"b"));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::traits::{CacheStore, KeyLockingStore, MapStore, StoreMetrics};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a cache handle and all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(u64);

impl CacheId {
    fn next() -> Self {
        Self(NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity shared by every clone of one cache handle.
///
/// Key lock acquisitions on fallback backends hold a strong reference to it;
/// the lock registry only holds a weak one.
#[derive(Debug)]
pub struct CacheIdentity {
    id: CacheId,
    name: String,
}

impl CacheIdentity {
    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a backend can do beyond point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Enumeration and native per-key locking.
    Rich,
    /// Enumeration only.
    PlainMap,
    /// Neither enumeration nor per-key locking.
    Opaque,
}

/// Rich backend: one store seen through both of its interfaces.
pub struct RichBackend<K, V> {
    pub(crate) map: Arc<dyn MapStore<K, V>>,
    pub(crate) locks: Arc<dyn KeyLockingStore<K>>,
}

impl<K, V> Clone for RichBackend<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
            locks: Arc::clone(&self.locks),
        }
    }
}

/// Backend of a cache, tagged by capability.
pub enum Backend<K, V> {
    Rich(RichBackend<K, V>),
    PlainMap(Arc<dyn MapStore<K, V>>),
    Opaque(Arc<dyn CacheStore<K, V>>),
}

impl<K, V> Clone for Backend<K, V> {
    fn clone(&self) -> Self {
        match self {
            Backend::Rich(rich) => Backend::Rich(rich.clone()),
            Backend::PlainMap(map) => Backend::PlainMap(Arc::clone(map)),
            Backend::Opaque(store) => Backend::Opaque(Arc::clone(store)),
        }
    }
}

impl<K, V> Backend<K, V> {
    /// Capability tag of this backend.
    pub fn capability(&self) -> Capability {
        match self {
            Backend::Rich(_) => Capability::Rich,
            Backend::PlainMap(_) => Capability::PlainMap,
            Backend::Opaque(_) => Capability::Opaque,
        }
    }

    fn store(&self) -> &dyn CacheStore<K, V> {
        match self {
            Backend::Rich(rich) => rich.map.as_ref(),
            Backend::PlainMap(map) => map.as_ref(),
            Backend::Opaque(store) => store.as_ref(),
        }
    }

    fn enumerable(&self) -> Option<&dyn MapStore<K, V>> {
        match self {
            Backend::Rich(rich) => Some(rich.map.as_ref()),
            Backend::PlainMap(map) => Some(map.as_ref()),
            Backend::Opaque(_) => None,
        }
    }
}

/// Named cache handle. Cloning is cheap and keeps the same identity.
pub struct Cache<K, V> {
    identity: Arc<CacheIdentity>,
    backend: Backend<K, V>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            backend: self.backend.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.identity.id)
            .field("name", &self.identity.name)
            .field("capability", &self.capability())
            .finish()
    }
}

impl<K, V> Cache<K, V> {
    /// Wrap `backend` in a new handle with a fresh identity.
    pub fn new(name: impl Into<String>, backend: Backend<K, V>) -> Self {
        Self {
            identity: Arc::new(CacheIdentity {
                id: CacheId::next(),
                name: name.into(),
            }),
            backend,
        }
    }

    /// Cache over a store with native per-key locks and enumeration.
    pub fn rich<S>(name: impl Into<String>, store: Arc<S>) -> Self
    where
        S: MapStore<K, V> + KeyLockingStore<K> + 'static,
    {
        let map: Arc<dyn MapStore<K, V>> = store.clone();
        let locks: Arc<dyn KeyLockingStore<K>> = store;
        Self::new(name, Backend::Rich(RichBackend { map, locks }))
    }

    /// Cache over an enumerable map without per-key locks.
    pub fn plain_map(name: impl Into<String>, store: Arc<dyn MapStore<K, V>>) -> Self {
        Self::new(name, Backend::PlainMap(store))
    }

    /// Cache over a store that only supports point operations.
    pub fn opaque(name: impl Into<String>, store: Arc<dyn CacheStore<K, V>>) -> Self {
        Self::new(name, Backend::Opaque(store))
    }

    pub fn id(&self) -> CacheId {
        self.identity.id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn capability(&self) -> Capability {
        self.backend.capability()
    }

    pub fn backend(&self) -> &Backend<K, V> {
        &self.backend
    }

    pub(crate) fn identity(&self) -> &Arc<CacheIdentity> {
        &self.identity
    }

    /// Returns `true` if both handles refer to the same cache.
    pub fn same_cache(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.identity, &other.identity)
    }

    /// Number of entries, or `0` when the backend cannot report it.
    pub fn size(&self) -> usize {
        self.backend.enumerable().map_or(0, |map| map.len())
    }

    /// Whether `key` is present.
    ///
    /// On opaque backends this reads the value and checks presence, which
    /// counts as a lookup in the store's metrics.
    pub fn contains_key(&self, key: &K) -> bool {
        match self.backend.enumerable() {
            Some(map) => map.contains(key),
            None => self.backend.store().get(key).is_some(),
        }
    }

    /// Snapshot of all keys, or an empty set when enumeration is unsupported.
    pub fn keys(&self) -> HashSet<K>
    where
        K: Eq + Hash,
    {
        match self.backend.enumerable() {
            Some(map) => map.keys().into_iter().collect(),
            None => HashSet::new(),
        }
    }

    /// Evict every entry whose key matches `predicate`.
    ///
    /// Returns `Some(n)` with the number of entries removed when the backend
    /// can enumerate. Otherwise the whole cache is cleared and `None` is
    /// returned, since the count of cleared entries is unknown.
    pub fn evict_if<P>(&self, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&K) -> bool,
    {
        match self.backend.enumerable() {
            Some(map) => {
                let evicted = map.remove_if(&mut predicate);
                tracing::trace!(cache = %self.name(), evicted, "evicted matching keys");
                Some(evicted)
            },
            None => {
                tracing::debug!(
                    cache = %self.name(),
                    "backend cannot enumerate keys, clearing whole cache"
                );
                self.backend.store().clear();
                None
            },
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.backend.store().get(key)
    }

    pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        self.backend.store().put(key, Arc::new(value))
    }

    pub fn put_arc(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        self.backend.store().put(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.backend.store().remove(key)
    }

    pub fn clear(&self) {
        self.backend.store().clear();
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.backend.store().metrics()
    }
}
