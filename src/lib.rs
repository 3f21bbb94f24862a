//! cachelock: a cache facade over interchangeable backends, with per-key
//! read/write locking that uses the backend's own locks when it has them.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod builder;
pub mod cache;
pub mod ds;
pub mod error;
pub mod lock;
pub mod manager;
pub mod prelude;
pub mod store;
