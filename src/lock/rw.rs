//! Writer-preferring reader/writer lock with interruptible waits.
//!
//! Backs every entry of the fallback key lock registry.
//!
//! ## Fairness Policy
//!
//! ```text
//!   readers    : any number at once, unless a writer holds the lock
//!                or a writer is waiting
//!   writer     : exclusive; waits for current readers to drain
//!   on release : a waiting writer goes first, otherwise all
//!                waiting readers are woken together
//! ```
//!
//! A stream of new readers therefore cannot starve a writer: once a writer
//! queues, later readers queue behind it. The converse holds only loosely: a
//! steady stream of writers can delay readers.
//!
//! ## Interruption
//!
//! Interruptible waits register the lock with the caller's
//! [`Interrupt`] token while parked. Interrupting wakes every waiter on the
//! lock; the interrupted one withdraws (restoring `waiting_writers` and
//! waking whoever it was holding back) and returns
//! [`LockError::Interrupted`]. Other waiters re-check and go back to sleep.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::LockError;
use crate::lock::interrupt::{Interrupt, Unpark};

#[derive(Debug, Default)]
struct RwState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

impl RwState {
    fn can_read(&self) -> bool {
        !self.writer && self.waiting_writers == 0
    }

    fn can_write(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

/// Reader/writer lock for one (cache, key) pair.
#[derive(Debug, Default)]
pub struct KeyRwLock {
    state: Mutex<RwState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
}

impl KeyRwLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a shared lock is held.
    pub fn read(self: &Arc<Self>) {
        // Without a token the wait cannot fail.
        let _ = self.acquire_read(None);
    }

    /// Block until the exclusive lock is held.
    pub fn write(self: &Arc<Self>) {
        let _ = self.acquire_write(None);
    }

    /// Block until a shared lock is held or `interrupt` fires.
    pub fn read_interruptibly(self: &Arc<Self>, interrupt: &Interrupt) -> Result<(), LockError> {
        self.acquire_read(Some(interrupt))
    }

    /// Block until the exclusive lock is held or `interrupt` fires.
    pub fn write_interruptibly(self: &Arc<Self>, interrupt: &Interrupt) -> Result<(), LockError> {
        self.acquire_write(Some(interrupt))
    }

    /// Take a shared lock only if that needs no waiting.
    pub fn try_read(&self) -> bool {
        let mut state = self.state.lock();
        if state.can_read() {
            state.readers += 1;
            true
        } else {
            false
        }
    }

    /// Take the exclusive lock only if that needs no waiting.
    pub fn try_write(&self) -> bool {
        let mut state = self.state.lock();
        if state.can_write() && state.waiting_writers == 0 {
            state.writer = true;
            true
        } else {
            false
        }
    }

    /// Release one shared lock.
    ///
    /// Panics if no shared lock is held.
    pub fn unlock_read(&self) {
        let mut state = self.state.lock();
        assert!(state.readers > 0, "unlock_read without a held read lock");
        state.readers -= 1;
        if state.readers == 0 && state.waiting_writers > 0 {
            self.writers_cv.notify_one();
        }
    }

    /// Release the exclusive lock.
    ///
    /// Panics if the exclusive lock is not held.
    pub fn unlock_write(&self) {
        let mut state = self.state.lock();
        assert!(state.writer, "unlock_write without a held write lock");
        state.writer = false;
        self.wake_next(&state);
    }

    /// Number of threads holding a shared lock.
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers
    }

    /// Whether the exclusive lock is held.
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer
    }

    /// Number of writers currently queued.
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }

    fn wake_next(&self, state: &RwState) {
        if state.waiting_writers > 0 {
            if state.can_write() {
                self.writers_cv.notify_one();
            }
        } else {
            self.readers_cv.notify_all();
        }
    }

    fn acquire_read(self: &Arc<Self>, interrupt: Option<&Interrupt>) -> Result<(), LockError> {
        if interrupt.is_some_and(Interrupt::take) {
            return Err(LockError::Interrupted);
        }
        let mut state = self.state.lock();
        if state.can_read() {
            state.readers += 1;
            return Ok(());
        }

        let _parked = interrupt.map(|i| i.park_on(self.clone() as Arc<dyn Unpark>));
        loop {
            if interrupt.is_some_and(Interrupt::take) {
                return Err(LockError::Interrupted);
            }
            if state.can_read() {
                state.readers += 1;
                return Ok(());
            }
            self.readers_cv.wait(&mut state);
        }
    }

    fn acquire_write(self: &Arc<Self>, interrupt: Option<&Interrupt>) -> Result<(), LockError> {
        if interrupt.is_some_and(Interrupt::take) {
            return Err(LockError::Interrupted);
        }
        let mut state = self.state.lock();
        if state.can_write() && state.waiting_writers == 0 {
            state.writer = true;
            return Ok(());
        }

        state.waiting_writers += 1;
        let _parked = interrupt.map(|i| i.park_on(self.clone() as Arc<dyn Unpark>));
        loop {
            if interrupt.is_some_and(Interrupt::take) {
                self.withdraw_writer(&mut state);
                return Err(LockError::Interrupted);
            }
            if state.can_write() {
                state.waiting_writers -= 1;
                state.writer = true;
                return Ok(());
            }
            self.writers_cv.wait(&mut state);
        }
    }

    /// Undo a queued writer's effect on others after it gives up.
    fn withdraw_writer(&self, state: &mut MutexGuard<'_, RwState>) {
        state.waiting_writers -= 1;
        if !state.writer {
            // Readers held back by this writer, or the next writer that may
            // have been handed a wakeup meant for us.
            self.wake_next(state);
        }
    }
}

impl Unpark for KeyRwLock {
    fn unpark_all(&self) {
        let _state = self.state.lock();
        self.readers_cv.notify_all();
        self.writers_cv.notify_all();
    }
}
