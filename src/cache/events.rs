//! Cache Events Module
//!
//! Change notifications fanned out to registered listeners.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, warn};

// == Cache Event ==
/// A state change of the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<P> {
    /// A product was written under `key`
    Updated { key: String, product: P },
    /// `key` was removed from both tiers
    Invalidated { key: String, reason: String },
    /// Every entry was removed from both tiers
    Cleared,
}

impl<P> CacheEvent<P> {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::Updated { .. } => "updated",
            CacheEvent::Invalidated { .. } => "invalidated",
            CacheEvent::Cleared => "cleared",
        }
    }

    /// The affected key, if the event concerns a single entry.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Updated { key, .. } | CacheEvent::Invalidated { key, .. } => Some(key),
            CacheEvent::Cleared => None,
        }
    }
}

// == Cache Listener ==
/// Observer of cache events.
///
/// Returning an error (or panicking) is logged by the cache and never reaches
/// the caller of the operation that raised the event.
pub trait CacheListener<P>: Send + Sync {
    fn on_event(&self, event: &CacheEvent<P>) -> anyhow::Result<()>;
}

impl<P, F> CacheListener<P> for F
where
    F: Fn(&CacheEvent<P>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &CacheEvent<P>) -> anyhow::Result<()> {
        self(event)
    }
}

// == Listener Id ==
/// Handle returned on registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// == Listener Registry ==
/// Ordered set of listeners; notification follows registration order.
pub struct ListenerRegistry<P> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn CacheListener<P>>)>>,
    next_id: AtomicU64,
}

impl<P> ListenerRegistry<P> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener and returns its handle.
    pub async fn add(&self, listener: Arc<dyn CacheListener<P>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().await.push((id, listener));
        id
    }

    /// Deregisters a listener. Returns false if the handle was unknown.
    pub async fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    // == Notify ==
    /// Delivers `event` to every listener, one at a time.
    ///
    /// The registry lock is released before any listener runs, so a listener
    /// may be added or removed concurrently without blocking delivery.
    pub async fn notify(&self, event: &CacheEvent<P>) {
        let snapshot: Vec<_> = self
            .listeners
            .read()
            .await
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        listener = %id,
                        event = event.kind(),
                        error = %e,
                        "Cache listener failed"
                    );
                }
                Err(_) => {
                    error!(listener = %id, event = event.kind(), "Cache listener panicked");
                }
            }
        }
    }
}

impl<P> Default for ListenerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for ListenerRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
