//! Per-key read/write locks over any cache backend.
//!
//! ## Architecture
//!
//! ```text
//!   KeyLocks<K>::create_lock(&cache, key, read_only)
//!        │
//!        │  match cache capability (fixed when the handle was built)
//!        ├── Rich ────────────► NativeKeyLock    backend's own key locks
//!        └── PlainMap/Opaque ─► FallbackKeyLock  LockRegistry<K> entry
//!                                      │
//!            lock() / lock_interruptibly(&Interrupt)
//!                                      ▼
//!                              LockAcquisition<K>   released on unlock()/drop
//! ```
//!
//! Key lock values are stateless routers. The only shared mutable state is
//! the fallback [`LockRegistry`], owned by [`KeyLocks`]. All code that locks
//! keys of one cache must go through the same `KeyLocks` (the
//! [`CacheManager`](crate::manager::CacheManager) owns one for this reason);
//! two registries know nothing of each other's locks.
//!
//! ## Typical Use
//!
//! ```
//! use std::sync::Arc;
//!
//! use cachelock::cache::Cache;
//! use cachelock::lock::KeyLocks;
//! use cachelock::store::sharded::ShardedStore;
//!
//! let cache: Cache<u64, String> =
//!     Cache::rich("vectors", Arc::new(ShardedStore::new(4, 256)));
//! let locks = KeyLocks::new();
//!
//! let value = {
//!     let _read = locks.acquire_read_lock(&cache, 7);
//!     cache.get(&7)
//! };
//! if value.is_none() {
//!     let _write = locks.acquire_write_lock(&cache, 7);
//!     // Re-check: another writer may have filled it while we waited.
//!     if !cache.contains_key(&7) {
//!         cache.put(7, "computed".to_string());
//!     }
//! }
//! assert_eq!(cache.get(&7).as_deref().map(String::as_str), Some("computed"));
//! ```

pub mod acquisition;
pub mod fallback;
pub mod interrupt;
pub mod native;
pub mod rw;

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

pub use acquisition::LockAcquisition;
pub use fallback::{FallbackKeyLock, LockRegistry};
pub use interrupt::Interrupt;
pub use native::NativeKeyLock;
pub use rw::KeyRwLock;

use crate::cache::{Backend, Cache};
use crate::error::{ConfigError, LockError};

/// Bounds required of keys that can be locked.
pub trait LockKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> LockKey for T where T: Eq + Hash + Clone + Send + Sync + 'static {}

/// Default length of one bounded attempt when polling a native key lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Key lock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    poll_interval: Duration,
}

impl LockConfig {
    /// Configuration with a custom native poll interval.
    ///
    /// Shorter intervals notice interruption sooner at the cost of more
    /// wakeups while waiting.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use cachelock::lock::LockConfig;
    ///
    /// assert!(LockConfig::try_with_poll_interval(Duration::from_millis(100)).is_ok());
    /// assert!(LockConfig::try_with_poll_interval(Duration::ZERO).is_err());
    /// ```
    pub fn try_with_poll_interval(poll_interval: Duration) -> Result<Self, ConfigError> {
        if poll_interval.is_zero() {
            return Err(ConfigError::new("poll_interval must be > 0"));
        }
        Ok(Self { poll_interval })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A lock on one (cache, key) pair in one mode.
pub trait KeyLock<K: LockKey> {
    /// Key this lock is bound to.
    fn key(&self) -> &K;

    /// `true` for shared (read) mode.
    fn is_read_only(&self) -> bool;

    /// Block until the lock is granted.
    fn lock(&self) -> LockAcquisition<K>;

    /// Block until the lock is granted or `interrupt` fires.
    ///
    /// An interrupt that is already pending fails the call before waiting.
    /// On failure no lock is held and the interrupt flag is consumed.
    fn lock_interruptibly(&self, interrupt: &Interrupt) -> Result<LockAcquisition<K>, LockError>;
}

/// Key lock chosen by [`KeyLocks::create_lock`].
pub enum AnyKeyLock<K: LockKey> {
    Native(NativeKeyLock<K>),
    Fallback(FallbackKeyLock<K>),
}

impl<K: LockKey> AnyKeyLock<K> {
    /// Returns `true` if the backend's own locking is used.
    pub fn is_native(&self) -> bool {
        matches!(self, AnyKeyLock::Native(_))
    }
}

impl<K: LockKey> KeyLock<K> for AnyKeyLock<K> {
    fn key(&self) -> &K {
        match self {
            AnyKeyLock::Native(lock) => lock.key(),
            AnyKeyLock::Fallback(lock) => lock.key(),
        }
    }

    fn is_read_only(&self) -> bool {
        match self {
            AnyKeyLock::Native(lock) => lock.is_read_only(),
            AnyKeyLock::Fallback(lock) => lock.is_read_only(),
        }
    }

    fn lock(&self) -> LockAcquisition<K> {
        match self {
            AnyKeyLock::Native(lock) => lock.lock(),
            AnyKeyLock::Fallback(lock) => lock.lock(),
        }
    }

    fn lock_interruptibly(&self, interrupt: &Interrupt) -> Result<LockAcquisition<K>, LockError> {
        match self {
            AnyKeyLock::Native(lock) => lock.lock_interruptibly(interrupt),
            AnyKeyLock::Fallback(lock) => lock.lock_interruptibly(interrupt),
        }
    }
}

/// Entry point for key locking: picks a strategy per cache and owns the
/// fallback registry.
pub struct KeyLocks<K: LockKey> {
    registry: Arc<LockRegistry<K>>,
    config: LockConfig,
}

impl<K: LockKey> Clone for KeyLocks<K> {
    /// Clones share the registry.
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: self.config,
        }
    }
}

impl<K: LockKey> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::with_config(LockConfig::default())
    }
}

impl<K: LockKey> std::fmt::Debug for KeyLocks<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl<K: LockKey> KeyLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LockConfig) -> Self {
        Self {
            registry: Arc::new(LockRegistry::new()),
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Fallback registry, for inspection.
    pub fn registry(&self) -> &LockRegistry<K> {
        &self.registry
    }

    /// Create a key lock for `key` in `cache`, native when the backend
    /// supports it.
    pub fn create_lock<V>(&self, cache: &Cache<K, V>, key: K, read_only: bool) -> AnyKeyLock<K> {
        match cache.backend() {
            Backend::Rich(rich) => AnyKeyLock::Native(NativeKeyLock::new(
                Arc::clone(&rich.locks),
                key,
                read_only,
                self.config.poll_interval,
            )),
            Backend::PlainMap(_) | Backend::Opaque(_) => {
                AnyKeyLock::Fallback(FallbackKeyLock::new(
                    Arc::clone(&self.registry),
                    Arc::clone(cache.identity()),
                    key,
                    read_only,
                ))
            },
        }
    }

    /// Block until a read lock on `key` in `cache` is held.
    pub fn acquire_read_lock<V>(&self, cache: &Cache<K, V>, key: K) -> LockAcquisition<K> {
        self.create_lock(cache, key, true).lock()
    }

    /// Block until the write lock on `key` in `cache` is held.
    pub fn acquire_write_lock<V>(&self, cache: &Cache<K, V>, key: K) -> LockAcquisition<K> {
        self.create_lock(cache, key, false).lock()
    }

    /// Like [`acquire_read_lock`](Self::acquire_read_lock), but gives up when
    /// `interrupt` fires.
    pub fn acquire_read_lock_interruptibly<V>(
        &self,
        cache: &Cache<K, V>,
        key: K,
        interrupt: &Interrupt,
    ) -> Result<LockAcquisition<K>, LockError> {
        self.create_lock(cache, key, true)
            .lock_interruptibly(interrupt)
    }

    /// Like [`acquire_write_lock`](Self::acquire_write_lock), but gives up
    /// when `interrupt` fires.
    pub fn acquire_write_lock_interruptibly<V>(
        &self,
        cache: &Cache<K, V>,
        key: K,
        interrupt: &Interrupt,
    ) -> Result<LockAcquisition<K>, LockError> {
        self.create_lock(cache, key, false)
            .lock_interruptibly(interrupt)
    }
}
