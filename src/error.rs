//! Error types for the cachelock library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned when a cache cannot be resolved or registered
//!   by name. Unknown names are configuration errors and are never retried.
//! - [`LockError`]: Returned by interruptible acquisition and by
//!   [`LockAcquisition::unlock`](crate::lock::LockAcquisition::unlock).
//! - [`ConfigError`]: Returned when builder or lock configuration parameters
//!   are invalid (e.g. zero capacity, zero poll interval).
//!
//! ## Example Usage
//!
//! ```
//! use cachelock::builder::{CacheBuilder, StoreKind};
//!
//! let bad = CacheBuilder::new("reports")
//!     .capacity(0)
//!     .try_build::<u64, String>(StoreKind::HashMap);
//! assert_eq!(bad.unwrap_err().message(), "capacity must be > 0");
//! ```

use thiserror::Error;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned when resolving or registering a named cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No cache with this name has been configured.
    #[error("no cache named `{0}` is configured")]
    UnknownCache(String),
    /// A cache with this name is already registered.
    #[error("a cache named `{0}` is already registered")]
    DuplicateCache(String),
}

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

/// Error returned by key lock acquisition and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// The waiting caller was interrupted before the lock was granted.
    /// No lock state is left behind.
    #[error("interrupted while waiting for a key lock")]
    Interrupted,
    /// The acquisition was already released.
    #[error("key lock is not held by this acquisition")]
    NotHeld,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::try_build`](crate::builder::CacheBuilder::try_build)
/// and [`LockConfig::try_with_poll_interval`](crate::lock::LockConfig::try_with_poll_interval).
/// Carries a human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use cachelock::builder::{CacheBuilder, StoreKind};
///
/// let err = CacheBuilder::new("stats")
///     .capacity(0)
///     .try_build::<u64, u64>(StoreKind::Sharded)
///     .unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
