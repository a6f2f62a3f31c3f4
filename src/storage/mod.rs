//! Storage Module
//!
//! Persistent key-value stores backing the cache's persistent tier.
//!
//! # Stores
//! - `MemoryStore` - process-local map, for tests and embedders
//! - `FileStore` - one JSON file per storage key inside a directory

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

// == Key Value Store ==
/// String-valued persistent store consumed by the cache.
///
/// Implementations report failures through [`crate::error::CacheError`];
/// the cache logs them and degrades to a miss or a no-op.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
