//! Unified cache builder for all backends.
//!
//! Hides which store type sits behind a [`Cache`] handle; the capability tag
//! follows from the [`StoreKind`] chosen.
//!
//! ## Example
//!
//! ```rust
//! use cachelock::builder::{CacheBuilder, StoreKind};
//! use cachelock::cache::Capability;
//!
//! let cache = CacheBuilder::new("gene2cs")
//!     .capacity(500)
//!     .build::<u64, String>(StoreKind::Sharded);
//! assert_eq!(cache.capability(), Capability::Rich);
//! cache.put(1, "hello".to_string());
//! assert_eq!(cache.get(&1).as_deref(), Some(&"hello".to_string()));
//! ```

use std::hash::Hash;
use std::sync::Arc;

use crate::cache::Cache;
use crate::error::ConfigError;
use crate::store::bounded::BoundedFifoStore;
use crate::store::hashmap::ConcurrentHashMapStore;
use crate::store::sharded::ShardedStore;

/// Default entry capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default number of per-key lock table shards for [`StoreKind::Sharded`].
pub const DEFAULT_LOCK_SHARDS: usize = 64;

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Sharded map with a native per-key lock table (rich capability).
    Sharded,
    /// Single concurrent map (plain-map capability).
    HashMap,
    /// Bounded FIFO store without enumeration (opaque capability).
    BoundedFifo,
}

/// Builder for named caches.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    name: String,
    capacity: usize,
    shards: usize,
    lock_shards: usize,
}

impl CacheBuilder {
    /// Create a builder with default sizing.
    pub fn new(name: impl Into<String>) -> Self {
        let shards = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            shards,
            lock_shards: DEFAULT_LOCK_SHARDS,
        }
    }

    /// Expected number of entries. A hard limit for [`StoreKind::BoundedFifo`],
    /// a preallocation hint otherwise.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Number of map shards for [`StoreKind::Sharded`].
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Number of per-key lock table shards for [`StoreKind::Sharded`].
    pub fn lock_shards(mut self, lock_shards: usize) -> Self {
        self.lock_shards = lock_shards;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a cache, validating the configuration.
    pub fn try_build<K, V>(self, kind: StoreKind) -> Result<Cache<K, V>, ConfigError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        if self.name.is_empty() {
            return Err(ConfigError::new("cache name must not be empty"));
        }
        if self.capacity == 0 {
            return Err(ConfigError::new("capacity must be > 0"));
        }
        if self.shards == 0 {
            return Err(ConfigError::new("shards must be > 0"));
        }
        if self.lock_shards == 0 {
            return Err(ConfigError::new("lock_shards must be > 0"));
        }

        let cache = match kind {
            StoreKind::Sharded => Cache::rich(
                self.name,
                Arc::new(ShardedStore::new(self.shards, self.lock_shards)),
            ),
            StoreKind::HashMap => Cache::plain_map(
                self.name,
                Arc::new(ConcurrentHashMapStore::new(self.capacity)),
            ),
            StoreKind::BoundedFifo => {
                Cache::opaque(self.name, Arc::new(BoundedFifoStore::new(self.capacity)))
            },
        };
        Ok(cache)
    }

    /// Build a cache.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use
    /// [`try_build`](Self::try_build) to handle that as an error.
    pub fn build<K, V>(self, kind: StoreKind) -> Cache<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        match self.try_build(kind) {
            Ok(cache) => cache,
            Err(err) => panic!("invalid cache configuration: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Capability;

    #[test]
    fn kind_determines_capability() {
        let cases = [
            (StoreKind::Sharded, Capability::Rich),
            (StoreKind::HashMap, Capability::PlainMap),
            (StoreKind::BoundedFifo, Capability::Opaque),
        ];
        for (kind, capability) in cases {
            let cache = CacheBuilder::new("c").build::<u32, u32>(kind);
            assert_eq!(cache.capability(), capability);
            assert_eq!(cache.name(), "c");
        }
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let zero_cap = CacheBuilder::new("c").capacity(0);
        assert!(zero_cap.try_build::<u32, u32>(StoreKind::HashMap).is_err());

        let zero_shards = CacheBuilder::new("c").shards(0);
        let err = zero_shards
            .try_build::<u32, u32>(StoreKind::Sharded)
            .unwrap_err();
        assert!(err.message().contains("shards"));

        let zero_lock_shards = CacheBuilder::new("c").lock_shards(0);
        assert!(zero_lock_shards.try_build::<u32, u32>(StoreKind::Sharded).is_err());

        assert!(CacheBuilder::new("").try_build::<u32, u32>(StoreKind::HashMap).is_err());
    }

    #[test]
    #[should_panic(expected = "invalid cache configuration")]
    fn build_panics_on_invalid_config() {
        let _ = CacheBuilder::new("c")
            .capacity(0)
            .build::<u32, u32>(StoreKind::BoundedFifo);
    }

    #[test]
    fn bounded_capacity_is_enforced() {
        let cache = CacheBuilder::new("c")
            .capacity(2)
            .build::<u32, u32>(StoreKind::BoundedFifo);
        for i in 0..3 {
            cache.put(i, i);
        }
        assert!(cache.get(&0).is_none());
        assert!(cache.get(&2).is_some());
    }
}
