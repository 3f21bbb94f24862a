//! Cooperative interruption for blocked lock waiters.
//!
//! An [`Interrupt`] is a cloneable token shared between a thread waiting in
//! `lock_interruptibly` and whoever wants to cancel that wait. Interrupting
//! sets a flag and, if the waiter is parked on a fallback key lock, wakes it
//! so it can observe the flag right away. Native waiters poll the flag
//! between bounded attempts instead.
//!
//! The flag is sticky until a waiter reports it: an acquisition that fails
//! with [`LockError::Interrupted`](crate::error::LockError::Interrupted)
//! consumes it, so the caller can retry with the same token.
//!
//! Several threads may wait with clones of one token. Interrupting wakes all
//! of them, and the first to observe the flag consumes it; the others go back
//! to waiting.
//!
//! ```
//! use cachelock::lock::Interrupt;
//!
//! let token = Interrupt::new();
//! let remote = token.clone();
//! remote.interrupt();
//! assert!(token.is_interrupted());
//! token.clear();
//! assert!(!token.is_interrupted());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Something a waiter can be parked on and woken from.
pub(crate) trait Unpark: Send + Sync {
    /// Wake every thread waiting on this object.
    fn unpark_all(&self);
}

#[derive(Default)]
struct InterruptState {
    flag: AtomicBool,
    parked_on: Mutex<Vec<Arc<dyn Unpark>>>,
}

/// Cloneable interruption token.
#[derive(Clone, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption of the waiters using this token.
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        let targets = self.state.parked_on.lock().clone();
        for target in targets {
            target.unpark_all();
        }
    }

    /// Returns `true` if interruption was requested and not yet consumed.
    pub fn is_interrupted(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Reset the flag without reporting it.
    pub fn clear(&self) {
        self.state.flag.store(false, Ordering::SeqCst);
    }

    /// Consume a pending interruption, returning whether there was one.
    pub(crate) fn take(&self) -> bool {
        self.state.flag.swap(false, Ordering::SeqCst)
    }

    /// Register `target` as the object to wake on interruption until the
    /// returned guard is dropped.
    ///
    /// Callers must check [`take`](Self::take) after parking and before
    /// waiting, while holding the lock that `target.unpark_all` acquires.
    pub(crate) fn park_on(&self, target: Arc<dyn Unpark>) -> Parked<'_> {
        self.state.parked_on.lock().push(Arc::clone(&target));
        Parked {
            interrupt: self,
            target,
        }
    }

    #[cfg(test)]
    fn parked_count(&self) -> usize {
        self.state.parked_on.lock().len()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}

/// Unregisters one registration of the parked target on drop.
pub(crate) struct Parked<'a> {
    interrupt: &'a Interrupt,
    target: Arc<dyn Unpark>,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        let mut parked = self.interrupt.state.parked_on.lock();
        if let Some(pos) = parked.iter().position(|t| Arc::ptr_eq(t, &self.target)) {
            parked.swap_remove(pos);
        }
    }
}
