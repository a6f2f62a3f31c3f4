//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_MEMORY_CACHE_SIZE, DEFAULT_STORAGE_KEY,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

/// Default directory for the file-backed persistent store
pub const DEFAULT_STORAGE_DIR: &str = ".product_cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries resident in the memory tier
    pub memory_cache_size: usize,
    /// Entry time-to-live in seconds
    pub cache_ttl: u64,
    /// Key under which the whole cache is persisted
    pub storage_key: String,
    /// Directory used by the file-backed persistent store
    pub storage_dir: PathBuf,
    /// Background sweep interval in seconds
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMORY_CACHE_SIZE` - Memory tier capacity (default: 100)
    /// - `CACHE_TTL` - Entry TTL in seconds (default: 86400)
    /// - `CACHE_STORAGE_KEY` - Persistent storage key (default: product_cache)
    /// - `CACHE_STORAGE_DIR` - File store directory (default: .product_cache)
    /// - `SWEEP_INTERVAL` - Expired-entry sweep frequency in seconds (default: 3600)
    pub fn from_env() -> Self {
        Self {
            memory_cache_size: env::var("MEMORY_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MEMORY_CACHE_SIZE),
            cache_ttl: env::var("CACHE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            storage_key: env::var("CACHE_STORAGE_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
            storage_dir: env::var("CACHE_STORAGE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            sweep_interval: env::var("SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            sweep_interval: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}
