//! Key locks delegated to a backend's own per-key locking.
//!
//! Blocking acquisition maps straight onto the backend's acquire call.
//! Interruptible acquisition cannot: the backend only offers a "try for at
//! most this long" primitive, not a wait that can be cancelled from outside.
//! [`NativeKeyLock::lock_interruptibly`] therefore retries bounded attempts of
//! [`LockConfig::poll_interval`](crate::lock::LockConfig::poll_interval) and
//! checks the interrupt token between them. An interruption is noticed at
//! the end of the attempt in progress, so latency is bounded by the poll
//! interval rather than immediate.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LockError;
use crate::lock::acquisition::{Hold, LockAcquisition};
use crate::lock::interrupt::Interrupt;
use crate::lock::{KeyLock, LockKey};
use crate::store::traits::KeyLockingStore;

/// Key lock backed by a [`KeyLockingStore`].
pub struct NativeKeyLock<K: LockKey> {
    locks: Arc<dyn KeyLockingStore<K>>,
    key: K,
    read_only: bool,
    poll_interval: Duration,
}

impl<K: LockKey> NativeKeyLock<K> {
    pub(crate) fn new(
        locks: Arc<dyn KeyLockingStore<K>>,
        key: K,
        read_only: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            locks,
            key,
            read_only,
            poll_interval,
        }
    }

    /// Length of one bounded attempt in [`lock_interruptibly`](KeyLock::lock_interruptibly).
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn try_once(&self) -> bool {
        if self.read_only {
            self.locks.try_read_lock_on_key(&self.key, self.poll_interval)
        } else {
            self.locks.try_write_lock_on_key(&self.key, self.poll_interval)
        }
    }

    fn acquired(&self) -> LockAcquisition<K> {
        LockAcquisition::new(
            self.key.clone(),
            self.read_only,
            Hold::Native {
                locks: Arc::clone(&self.locks),
            },
        )
    }
}

impl<K: LockKey> KeyLock<K> for NativeKeyLock<K> {
    fn key(&self) -> &K {
        &self.key
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn lock(&self) -> LockAcquisition<K> {
        if self.read_only {
            self.locks.acquire_read_lock_on_key(&self.key);
        } else {
            self.locks.acquire_write_lock_on_key(&self.key);
        }
        self.acquired()
    }

    fn lock_interruptibly(&self, interrupt: &Interrupt) -> Result<LockAcquisition<K>, LockError> {
        let mut attempts = 0u32;
        loop {
            if interrupt.take() {
                tracing::debug!(
                    read_only = self.read_only,
                    attempts,
                    "interrupted while polling native key lock"
                );
                return Err(LockError::Interrupted);
            }
            if self.try_once() {
                return Ok(self.acquired());
            }
            attempts = attempts.saturating_add(1);
        }
    }
}
