//! Deterministic key-to-slot mapping.
//!
//! Used by [`ShardedStore`](crate::store::sharded::ShardedStore) twice: once
//! to pick the map shard holding a key, and once (with a different seed) to
//! pick the lock table shard that registers its native lock. Using separate
//! seeds keeps the two distributions independent, so keys crowded into one
//! map shard are not also crowded into one lock table shard.
//!
//! ```text
//!   key ──► FxHasher(seed, key) ──► hash % slots ──► index in [0, slots)
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use cachelock::ds::ShardSelector;
//!
//! let selector = ShardSelector::new(4, 0);
//! let shard = selector.shard_for_key(&"user:123");
//! assert!(shard < 4);
//! assert_eq!(selector.shard_for_key(&"user:123"), shard);
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Deterministic slot selector using a seeded hash.
///
/// The same `(key, seed, slots)` tuple always produces the same result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSelector {
    slots: usize,
    seed: u64,
}

impl ShardSelector {
    /// Creates a selector over `slots` slots with the given `seed`.
    ///
    /// The slot count is clamped to at least 1.
    ///
    /// ```
    /// use cachelock::ds::ShardSelector;
    ///
    /// assert_eq!(ShardSelector::new(0, 0).shard_count(), 1);
    /// ```
    pub fn new(slots: usize, seed: u64) -> Self {
        Self {
            slots: slots.max(1),
            seed,
        }
    }

    /// Returns the number of slots.
    pub fn shard_count(&self) -> usize {
        self.slots
    }

    /// Maps a key to a slot index in `[0, slots)`.
    pub fn shard_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.slots
    }
}

impl Default for ShardSelector {
    /// Creates a single-slot selector with seed 0.
    fn default() -> Self {
        Self::new(1, 0)
    }
}
