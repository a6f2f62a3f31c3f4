//! Product Cache - A two-tier cache for scanned products
//!
//! Keeps product records keyed by barcode in a bounded LRU memory tier backed
//! by a persistent key-value store, expires them after a TTL, and notifies
//! listeners of updates, invalidations and clears.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;

pub use cache::{CacheEvent, CacheListener, CacheStats, ProductCache};
pub use config::Config;
pub use context::AppContext;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
