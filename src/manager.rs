//! Named cache registry.
//!
//! [`CacheManager`] resolves cache names to [`Cache`] handles and owns the
//! [`KeyLocks`] used for all of them, so every caller that locks keys of a
//! managed cache meets the same fallback lock registry.
//!
//! Looking up a name that was never configured is a configuration error:
//! [`get_cache`](CacheManager::get_cache) returns
//! [`CacheError::UnknownCache`] and the caller is expected to fail rather
//! than retry.
//!
//! ```
//! use cachelock::builder::{CacheBuilder, StoreKind};
//! use cachelock::error::CacheError;
//! use cachelock::manager::CacheManager;
//!
//! let manager: CacheManager<u64, String> = CacheManager::new();
//! manager.create_or_load_cache(CacheBuilder::new("eestats").capacity(5_000), StoreKind::Sharded)?;
//!
//! let stats = manager.get_cache("eestats")?;
//! let _write = manager.locks().acquire_write_lock(&stats, 42);
//! stats.put(42, "report".to_string());
//!
//! assert_eq!(
//!     manager.get_cache("missing").unwrap_err(),
//!     CacheError::UnknownCache("missing".to_string())
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::hash_map::Entry;
use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::builder::{CacheBuilder, StoreKind};
use crate::cache::Cache;
use crate::error::{CacheError, ConfigError};
use crate::lock::{KeyLocks, LockConfig, LockKey};

/// Registry of caches by name, sharing one set of key locks.
pub struct CacheManager<K: LockKey, V> {
    caches: RwLock<FxHashMap<String, Cache<K, V>>>,
    locks: KeyLocks<K>,
}

impl<K: LockKey, V> Default for CacheManager<K, V> {
    fn default() -> Self {
        Self::with_lock_config(LockConfig::default())
    }
}

impl<K: LockKey, V> fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &self.cache_names())
            .field("locks", &self.locks)
            .finish()
    }
}

impl<K: LockKey, V> CacheManager<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_config(config: LockConfig) -> Self {
        Self {
            caches: RwLock::new(FxHashMap::default()),
            locks: KeyLocks::with_config(config),
        }
    }

    /// Key locks shared by every cache of this manager.
    pub fn locks(&self) -> &KeyLocks<K> {
        &self.locks
    }

    /// Resolve a cache by name.
    pub fn get_cache(&self, name: &str) -> Result<Cache<K, V>, CacheError> {
        match self.caches.read().get(name) {
            Some(cache) => Ok(cache.clone()),
            None => {
                tracing::error!(cache = name, "no cache with this name is configured");
                Err(CacheError::UnknownCache(name.to_string()))
            },
        }
    }

    /// Register an existing cache under its own name.
    pub fn register(&self, cache: Cache<K, V>) -> Result<(), CacheError> {
        match self.caches.write().entry(cache.name().to_string()) {
            Entry::Occupied(entry) => Err(CacheError::DuplicateCache(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(
                    cache = %cache.name(),
                    capability = ?cache.capability(),
                    "registered cache"
                );
                entry.insert(cache);
                Ok(())
            },
        }
    }

    /// Unregister a cache, returning it if it was present.
    ///
    /// Outstanding handles and locks stay valid.
    pub fn remove_cache(&self, name: &str) -> Option<Cache<K, V>> {
        self.caches.write().remove(name)
    }

    /// Names of all registered caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.caches.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }
}

impl<K, V> CacheManager<K, V>
where
    K: LockKey,
    V: Send + Sync + 'static,
{
    /// Return the cache named by `builder`, building and registering it
    /// first if absent.
    ///
    /// An existing cache is returned as is, even if `builder` or `kind`
    /// describe a different configuration.
    pub fn create_or_load_cache(
        &self,
        builder: CacheBuilder,
        kind: StoreKind,
    ) -> Result<Cache<K, V>, ConfigError> {
        if let Some(existing) = self.caches.read().get(builder.name()) {
            return Ok(existing.clone());
        }

        let mut caches = self.caches.write();
        // Another caller may have created it between the two locks.
        if let Some(existing) = caches.get(builder.name()) {
            return Ok(existing.clone());
        }
        let cache = builder.try_build::<K, V>(kind)?;
        tracing::debug!(
            cache = %cache.name(),
            capability = ?cache.capability(),
            "created cache"
        );
        caches.insert(cache.name().to_string(), cache.clone());
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_an_error() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        assert_eq!(
            manager.get_cache("nope").unwrap_err(),
            CacheError::UnknownCache("nope".into())
        );
    }

    #[test]
    fn create_or_load_returns_same_cache() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        let a = manager
            .create_or_load_cache(CacheBuilder::new("c"), StoreKind::HashMap)
            .unwrap();
        let b = manager
            .create_or_load_cache(CacheBuilder::new("c"), StoreKind::Sharded)
            .unwrap();
        assert!(a.same_cache(&b));
        assert!(manager.get_cache("c").unwrap().same_cache(&a));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn create_or_load_propagates_config_errors() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        let result =
            manager.create_or_load_cache(CacheBuilder::new("c").capacity(0), StoreKind::HashMap);
        assert!(result.is_err());
        assert!(manager.is_empty());
    }

    #[test]
    fn register_rejects_duplicates() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        let cache = CacheBuilder::new("dup").build(StoreKind::BoundedFifo);
        manager.register(cache.clone()).unwrap();
        assert_eq!(
            manager.register(cache),
            Err(CacheError::DuplicateCache("dup".into()))
        );
    }

    #[test]
    fn remove_and_list_caches() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        for name in ["b", "a"] {
            manager
                .create_or_load_cache(CacheBuilder::new(name), StoreKind::HashMap)
                .unwrap();
        }
        assert_eq!(manager.cache_names(), vec!["a", "b"]);
        assert!(manager.remove_cache("a").is_some());
        assert!(manager.get_cache("a").is_err());
        assert_eq!(manager.cache_names(), vec!["b"]);
    }

    #[test]
    fn managed_caches_share_key_locks() {
        let manager: CacheManager<u32, u32> = CacheManager::new();
        let cache = manager
            .create_or_load_cache(CacheBuilder::new("c"), StoreKind::HashMap)
            .unwrap();
        let resolved = manager.get_cache("c").unwrap();

        let _held = manager.locks().acquire_read_lock(&cache, 1);
        assert!(manager.locks().registry().is_registered(&resolved, &1));
    }
}
