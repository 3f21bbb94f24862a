pub use crate::builder::{CacheBuilder, StoreKind};
pub use crate::cache::{Cache, CacheId, Capability};
pub use crate::error::{CacheError, ConfigError, LockError};
pub use crate::lock::{
    AnyKeyLock, Interrupt, KeyLock, KeyLocks, LockAcquisition, LockConfig, LockKey,
};
pub use crate::manager::CacheManager;
pub use crate::store::{CacheStore, KeyLockingStore, MapStore, StoreMetrics};
