//! Token for one held key lock.
//!
//! A [`LockAcquisition`] is returned by every successful key lock and
//! released either explicitly with [`unlock`](LockAcquisition::unlock) or
//! implicitly when dropped, so a critical section releases on every exit
//! path, including unwinding.
//!
//! ```text
//!   lock() ──► Held ──unlock()/drop──► Released
//!                                          │
//!                              unlock() ───┘ Err(LockError::NotHeld)
//! ```
//!
//! For fallback locks the token keeps strong references to the cache
//! identity, the key and the registry entry, and counts as one user of that
//! entry until it is released. A held entry is therefore never reclaimed and
//! replaced by a fresh lock while the token is alive.

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheIdentity;
use crate::error::LockError;
use crate::lock::LockKey;
use crate::lock::fallback::LockRegistry;
use crate::lock::rw::KeyRwLock;
use crate::store::traits::KeyLockingStore;

/// How to release a held lock.
pub(crate) enum Hold<K> {
    Native {
        locks: Arc<dyn KeyLockingStore<K>>,
    },
    Fallback {
        entry: Arc<KeyRwLock>,
        registry: Arc<LockRegistry<K>>,
        cache: Arc<CacheIdentity>,
    },
}

/// A held read or write lock on one cache key.
#[must_use = "the key lock is released as soon as the acquisition is dropped"]
pub struct LockAcquisition<K: LockKey> {
    key: K,
    read_only: bool,
    hold: Option<Hold<K>>,
}

impl<K: LockKey> LockAcquisition<K> {
    pub(crate) fn new(key: K, read_only: bool, hold: Hold<K>) -> Self {
        Self {
            key,
            read_only,
            hold: Some(hold),
        }
    }

    /// Key this lock was taken on.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// `true` for a shared (read) lock, `false` for an exclusive one.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// `true` until the lock is released.
    pub fn is_held(&self) -> bool {
        self.hold.is_some()
    }

    /// Release the lock now.
    ///
    /// Releases exactly the mode that was acquired. Calling it again returns
    /// [`LockError::NotHeld`] and touches no lock state.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        match self.hold.take() {
            Some(hold) => {
                self.release(hold);
                Ok(())
            },
            None => {
                tracing::warn!(read_only = self.read_only, "key lock released twice");
                Err(LockError::NotHeld)
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn hold_for_test(&self) -> Option<&Hold<K>> {
        self.hold.as_ref()
    }

    fn release(&self, hold: Hold<K>) {
        match hold {
            Hold::Native { locks } => {
                // SAFETY: `hold` is taken out of `self` exactly once, and it
                // was only created after the native lock was granted in the
                // mode recorded by `read_only`.
                unsafe {
                    if self.read_only {
                        locks.release_read_lock_on_key(&self.key);
                    } else {
                        locks.release_write_lock_on_key(&self.key);
                    }
                }
            },
            Hold::Fallback {
                entry,
                registry,
                cache,
            } => {
                if self.read_only {
                    entry.unlock_read();
                } else {
                    entry.unlock_write();
                }
                registry.reclaim(cache.id(), &self.key, entry);
            },
        }
    }
}

impl<K: LockKey> Drop for LockAcquisition<K> {
    fn drop(&mut self) {
        if let Some(hold) = self.hold.take() {
            self.release(hold);
        }
    }
}

impl<K: LockKey + fmt::Debug> fmt::Debug for LockAcquisition<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.hold {
            Some(Hold::Native { .. }) => "native",
            Some(Hold::Fallback { .. }) => "fallback",
            None => "released",
        };
        f.debug_struct("LockAcquisition")
            .field("key", &self.key)
            .field("read_only", &self.read_only)
            .field("backend", &backend)
            .finish()
    }
}
