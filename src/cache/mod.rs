//! Cache Module
//!
//! Provides a two-tier product cache with TTL expiration, LRU eviction on the
//! memory tier and change listeners.

mod entry;
mod events;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use events::{CacheEvent, CacheListener, ListenerId, ListenerRegistry};
pub use lru::LruTracker;
pub use stats::{AccessCounters, CacheStats};
pub use store::{Cacheable, ProductCache, SweepReport};

// == Public Constants ==
/// Default memory tier capacity
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 100;

/// Default entry lifetime in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default key under which the whole cache is persisted
pub const DEFAULT_STORAGE_KEY: &str = "product_cache";

/// Default interval between expired-entry sweeps in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
