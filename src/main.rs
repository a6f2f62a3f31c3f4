//! Product Cache - host process
//!
//! Opens the persisted product cache, keeps it swept of expired entries and
//! logs cache events until shutdown.

use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use product_cache::models::Product;
use product_cache::{spawn_sweep_task, AppContext, CacheEvent, CacheListener, Config};

/// Main entry point for the product cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the file-backed cache and load persisted entries
/// 4. Register a listener that logs cache events
/// 5. Start background TTL sweep task
/// 6. Wait for SIGINT/SIGTERM and stop the sweep task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "product_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting product cache");

    let config = Config::from_env();
    info!(
        memory_cache_size = config.memory_cache_size,
        cache_ttl_secs = config.cache_ttl,
        storage_key = %config.storage_key,
        storage_dir = %config.storage_dir.display(),
        sweep_interval_secs = config.sweep_interval,
        "Configuration loaded"
    );

    let context = AppContext::from_config(&config).await;

    let event_log: Arc<dyn CacheListener<Product>> =
        Arc::new(|event: &CacheEvent<Product>| -> anyhow::Result<()> {
            info!(event = event.kind(), key = event.key().unwrap_or("*"), "Cache event");
            Ok(())
        });
    context.cache.add_listener(event_log).await;

    let stats = context.cache.get_cache_stats().await;
    info!(
        memory_size = stats.memory_size,
        oldest_entry = ?stats.oldest_entry,
        newest_entry = ?stats.newest_entry,
        "Product cache ready"
    );

    let sweep_handle = spawn_sweep_task(context.cache.clone(), config.sweep_interval);
    info!("Background sweep task started");

    shutdown_signal().await;

    sweep_handle.abort();
    warn!("Sweep task aborted");

    let stats = context.cache.get_cache_stats().await;
    info!(
        memory_size = stats.memory_size,
        hit_rate = stats.hit_rate(),
        "Product cache shutdown complete"
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
