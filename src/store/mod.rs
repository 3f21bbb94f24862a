pub mod bounded;
pub mod hashmap;
pub mod sharded;
pub mod traits;

pub use bounded::BoundedFifoStore;
pub use hashmap::ConcurrentHashMapStore;
pub use sharded::ShardedStore;
pub use traits::{CacheStore, KeyLockingStore, MapStore, StoreMetrics};
