//! Application Context
//!
//! Root object that constructs the product cache once and hands it to every
//! consumer that needs it.

use std::sync::Arc;

use tracing::info;

use crate::cache::ProductCache;
use crate::config::Config;
use crate::models::Product;
use crate::storage::{FileStore, KeyValueStore};

/// Application state shared across all cache consumers.
///
/// Cloning is cheap; every clone shares the same cache instance.
#[derive(Clone)]
pub struct AppContext {
    /// Shared product cache
    pub cache: Arc<ProductCache<Product>>,
}

impl AppContext {
    /// Wraps an existing cache.
    pub fn new(cache: ProductCache<Product>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the context over an arbitrary persistent store and loads the
    /// persisted entries.
    pub async fn with_store(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(ProductCache::open(store, config).await)
    }

    /// Builds the context over a file store in `config.storage_dir`.
    pub async fn from_config(config: &Config) -> Self {
        let store = FileStore::new(&config.storage_dir);
        info!(dir = %store.dir().display(), "Using file-backed product cache store");
        Self::with_store(Arc::new(store), config).await
    }
}
