//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from both cache tiers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Cacheable, ProductCache};

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. Each sweep purges the memory tier, then rewrites the
/// persisted blob without its expired entries. Storage failures are logged
/// by the cache and the next sweep simply tries again.
///
/// # Arguments
/// * `cache` - Shared cache to sweep
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(ProductCache::open(store, &config).await);
/// let sweep_handle = spawn_sweep_task(cache.clone(), config.sweep_interval);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task<P: Cacheable>(
    cache: Arc<ProductCache<P>>,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let report = cache.sweep_expired().await;

            if report.total() > 0 {
                info!(
                    memory_removed = report.memory_removed,
                    persistent_removed = report.persistent_removed,
                    "TTL sweep: removed expired entries"
                );
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
