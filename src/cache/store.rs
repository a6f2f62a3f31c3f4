//! Product Cache Module
//!
//! Two-tier cache engine: a bounded LRU memory tier in front of a persistent
//! key-value store, with TTL expiration on both tiers and listener fan-out.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{
    AccessCounters, CacheEntry, CacheEvent, CacheListener, CacheStats, ListenerId,
    ListenerRegistry, LruTracker, DEFAULT_STORAGE_KEY,
};
use crate::config::Config;
use crate::storage::KeyValueStore;

/// Bounds required of anything the cache stores.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The persisted blob: every entry keyed by product key.
type PersistedEntries<P> = HashMap<String, CacheEntry<P>>;

// == Sweep Report ==
/// Number of expired entries removed by [`ProductCache::sweep_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub persistent_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.memory_removed + self.persistent_removed
    }
}

// == Memory Tier ==
enum MemoryLookup<P> {
    Hit(P),
    Expired,
    Miss,
}

#[derive(Debug)]
struct MemoryTier<P> {
    entries: HashMap<String, CacheEntry<P>>,
    lru: LruTracker,
    counters: AccessCounters,
    capacity: usize,
}

impl<P: Clone> MemoryTier<P> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            counters: AccessCounters::new(),
            capacity,
        }
    }

    /// Reads `key`, recording the access on a fresh hit and dropping the
    /// entry if it has expired.
    fn lookup(&mut self, key: &str, ttl: Duration, now: DateTime<Utc>) -> MemoryLookup<P> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(ttl, now),
            None => return MemoryLookup::Miss,
        };

        if expired {
            self.remove(key);
            return MemoryLookup::Expired;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.record_access_at(now);
                let product = entry.product.clone();
                self.lru.touch(key);
                self.counters.record_memory_hit();
                MemoryLookup::Hit(product)
            }
            None => MemoryLookup::Miss,
        }
    }

    /// Whether `key` is resident, and if so whether it is still fresh.
    fn freshness(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<bool> {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired_at(ttl, now))
    }

    /// Inserts or replaces `key`, evicting the LRU entry first when a new key
    /// would exceed capacity. Returns the evicted key.
    fn insert(&mut self, key: String, entry: CacheEntry<P>) -> Option<String> {
        let mut evicted = None;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.lru.evict_oldest() {
                self.entries.remove(&oldest);
                self.counters.record_eviction();
                evicted = Some(oldest);
            }
        }

        self.lru.touch(&key);
        self.entries.insert(key, entry);
        evicted
    }

    /// Promotes a persisted entry unless the key became resident meanwhile,
    /// in which case the resident (newer) product wins.
    fn promote(
        &mut self,
        key: &str,
        mut entry: CacheEntry<P>,
        now: DateTime<Utc>,
    ) -> (P, Option<String>) {
        if let Some(resident) = self.entries.get_mut(key) {
            resident.record_access_at(now);
            let product = resident.product.clone();
            self.lru.touch(key);
            return (product, None);
        }

        entry.record_access_at(now);
        let product = entry.product.clone();
        let evicted = self.insert(key.to_string(), entry);
        (product, evicted)
    }

    fn remove(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.entries.remove(key).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    fn purge_expired(&mut self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove(key);
        }

        expired_keys.len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats::from_entries(self.entries.values(), self.counters.clone())
    }
}

// == Product Cache ==
/// Read-through, write-through product cache.
///
/// One instance is created by the application root and shared through an
/// `Arc`. Public operations never fail: storage and serialization faults are
/// logged and turned into misses or no-ops.
///
/// Lock order is `persist_lock` then `memory`; the memory lock is never held
/// across a storage call.
pub struct ProductCache<P> {
    memory: Mutex<MemoryTier<P>>,
    persist_lock: Mutex<()>,
    store: Arc<dyn KeyValueStore>,
    listeners: ListenerRegistry<P>,
    storage_key: String,
    ttl: Duration,
}

impl<P: Cacheable> ProductCache<P> {
    // == Constructor ==
    /// Creates a cache holding at most `memory_cache_size` entries in memory
    /// (clamped to at least one) whose entries live for `ttl_secs` seconds.
    pub fn new(store: Arc<dyn KeyValueStore>, memory_cache_size: usize, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            memory: Mutex::new(MemoryTier::new(memory_cache_size.max(1))),
            persist_lock: Mutex::new(()),
            store,
            listeners: ListenerRegistry::new(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            ttl,
        }
    }

    /// Creates a cache from configuration without touching storage.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, config.memory_cache_size, config.cache_ttl)
            .with_storage_key(config.storage_key.clone())
    }

    /// Creates a cache from configuration and loads the persisted entries.
    pub async fn open(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let cache = Self::from_config(store, config);
        cache.initialize().await;
        cache
    }

    /// Overrides the key under which the whole cache is persisted.
    pub fn with_storage_key(mut self, storage_key: impl Into<String>) -> Self {
        self.storage_key = storage_key.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    // == Initialize ==
    /// Loads the persisted blob, drops expired entries from it, and seeds the
    /// memory tier with the most recently accessed survivors.
    ///
    /// Seeding follows ascending `last_accessed`, so the persisted access
    /// history becomes the initial LRU order. Returns the number of entries
    /// now resident in memory.
    pub async fn initialize(&self) -> usize {
        let now = Utc::now();
        let _persist = self.persist_lock.lock().await;

        let Some(mut persisted) = self.load_persisted().await else {
            return 0;
        };

        let before = persisted.len();
        persisted.retain(|_, entry| !entry.is_expired_at(self.ttl, now));
        let purged = before - persisted.len();
        if purged > 0 {
            self.save_persisted(&persisted).await;
        }

        let mut memory = self.memory.lock().await;
        let mut seeds: Vec<(String, CacheEntry<P>)> = persisted
            .into_iter()
            .filter(|(key, _)| !memory.entries.contains_key(key))
            .collect();
        seeds.sort_by_key(|(_, entry)| entry.last_accessed);

        // Seeds only fill free slots; resident entries are never evicted
        let room = memory.capacity.saturating_sub(memory.entries.len());
        let skip = seeds.len().saturating_sub(room);
        for (key, entry) in seeds.into_iter().skip(skip) {
            memory.insert(key, entry);
        }
        let loaded = memory.entries.len();
        drop(memory);

        info!(
            storage_key = %self.storage_key,
            loaded,
            purged,
            "Product cache initialized"
        );
        loaded
    }

    // == Get ==
    /// Returns the product cached under `key`, if present and fresh.
    ///
    /// Memory is consulted first; a persistent hit is promoted into memory,
    /// which may evict the least recently used entry. Expired entries are
    /// purged from both tiers on the way.
    pub async fn get_product(&self, key: &str) -> Option<P> {
        let now = Utc::now();

        let lookup = self.memory.lock().await.lookup(key, self.ttl, now);
        match lookup {
            MemoryLookup::Hit(product) => {
                debug!(key, "Memory cache hit");
                return Some(product);
            }
            MemoryLookup::Expired => {
                debug!(key, "Memory entry expired");
                let _persist = self.persist_lock.lock().await;
                self.purge_persisted_if_expired(key, now).await;
                self.memory.lock().await.counters.record_miss();
                return None;
            }
            MemoryLookup::Miss => {}
        }

        let _persist = self.persist_lock.lock().await;
        let persisted = self.load_persisted().await.unwrap_or_default();

        let Some(entry) = persisted.get(key).cloned() else {
            debug!(key, "Cache miss");
            self.memory.lock().await.counters.record_miss();
            return None;
        };

        if entry.is_expired_at(self.ttl, now) {
            debug!(key, "Persisted entry expired, purging");
            let mut persisted = persisted;
            persisted.remove(key);
            self.save_persisted(&persisted).await;
            self.memory.lock().await.counters.record_miss();
            return None;
        }

        let mut memory = self.memory.lock().await;
        let (product, evicted) = memory.promote(key, entry, now);
        memory.counters.record_persistent_hit();
        drop(memory);

        if let Some(evicted) = evicted {
            debug!(key = %evicted, "Evicted least recently used entry");
        }
        debug!(key, "Persistent cache hit, promoted to memory");
        Some(product)
    }

    // == Set ==
    /// Caches `product` under `key` in both tiers and notifies listeners.
    ///
    /// The entry is stamped fresh and becomes most recently used. A new key
    /// at capacity evicts the least recently used memory entry; its persisted
    /// copy is kept.
    pub async fn set_product(&self, key: impl Into<String>, product: P) {
        let key = key.into();
        let entry = CacheEntry::new_at(product.clone(), Utc::now());

        {
            let _persist = self.persist_lock.lock().await;

            let evicted = self.memory.lock().await.insert(key.clone(), entry.clone());
            if let Some(evicted) = evicted {
                debug!(key = %evicted, "Evicted least recently used entry");
            }

            if let Some(mut persisted) = self.load_persisted().await {
                persisted.insert(key.clone(), entry);
                self.save_persisted(&persisted).await;
            }
        }

        debug!(key = %key, "Cached product");
        self.listeners
            .notify(&CacheEvent::Updated { key, product })
            .await;
    }

    // == Has ==
    /// Whether a fresh entry exists for `key` in either tier.
    ///
    /// Read-only: does not change access order, promote, or purge.
    pub async fn has_product(&self, key: &str) -> bool {
        let now = Utc::now();

        // A resident entry is never older than its persisted copy.
        if let Some(fresh) = self.memory.lock().await.freshness(key, self.ttl, now) {
            return fresh;
        }

        self.load_persisted()
            .await
            .and_then(|persisted| {
                persisted
                    .get(key)
                    .map(|entry| !entry.is_expired_at(self.ttl, now))
            })
            .unwrap_or(false)
    }

    // == Invalidate ==
    /// Removes `key` from both tiers and notifies listeners.
    ///
    /// `reason` is diagnostic only and is passed through to listeners.
    pub async fn invalidate_product(&self, key: &str, reason: impl Into<String>) {
        let reason = reason.into();

        let removed = {
            let _persist = self.persist_lock.lock().await;
            let in_memory = self.memory.lock().await.remove(key);
            let persisted = self.remove_persisted(key).await;
            in_memory || persisted
        };

        info!(key, reason = %reason, removed, "Invalidated cached product");
        self.listeners
            .notify(&CacheEvent::Invalidated {
                key: key.to_string(),
                reason,
            })
            .await;
    }

    // == Clear ==
    /// Empties both tiers and notifies listeners.
    pub async fn clear_cache(&self) {
        {
            let _persist = self.persist_lock.lock().await;
            self.memory.lock().await.clear();

            if let Err(e) = self.store.remove(&self.storage_key).await {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "Failed to clear persistent cache"
                );
            }
        }

        info!("Product cache cleared");
        self.listeners.notify(&CacheEvent::Cleared).await;
    }

    // == Stats ==
    /// Snapshot of the memory tier and lifetime counters.
    pub async fn get_cache_stats(&self) -> CacheStats {
        self.memory.lock().await.stats()
    }

    /// Keys resident in the memory tier, least recently used first.
    pub async fn memory_keys(&self) -> Vec<String> {
        self.memory
            .lock()
            .await
            .lru
            .keys()
            .map(str::to_string)
            .collect()
    }

    // == Listeners ==
    pub async fn add_listener(&self, listener: Arc<dyn CacheListener<P>>) -> ListenerId {
        self.listeners.add(listener).await
    }

    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id).await
    }

    // == Sweep Expired ==
    /// Removes expired entries from memory, then from the persisted blob.
    ///
    /// A storage failure is logged and counted as nothing removed from the
    /// persistent tier.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = Utc::now();
        let memory_removed = self.memory.lock().await.purge_expired(self.ttl, now);

        let _persist = self.persist_lock.lock().await;
        let persistent_removed = match self.load_persisted().await {
            Some(mut persisted) => {
                let before = persisted.len();
                persisted.retain(|_, entry| !entry.is_expired_at(self.ttl, now));
                let removed = before - persisted.len();
                if removed > 0 {
                    self.save_persisted(&persisted).await;
                }
                removed
            }
            None => 0,
        };

        SweepReport {
            memory_removed,
            persistent_removed,
        }
    }

    // == Read Through ==
    /// Returns the cached product, or awaits `fetch` on a miss and caches
    /// what it returns.
    ///
    /// Errors from `fetch` are returned untouched and nothing is cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<Option<P>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<P>, E>>,
    {
        if let Some(product) = self.get_product(key).await {
            return Ok(Some(product));
        }

        match fetch().await? {
            Some(product) => {
                self.set_product(key, product.clone()).await;
                Ok(Some(product))
            }
            None => Ok(None),
        }
    }

    // == Persistence Helpers ==
    /// Reads the persisted blob.
    ///
    /// `None` means the store itself failed, and callers must not write back.
    /// Missing or corrupted data reads as an empty map.
    async fn load_persisted(&self) -> Option<PersistedEntries<P>> {
        let raw = match self.store.get(&self.storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Some(HashMap::new()),
            Err(e) => {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "Failed to read persistent cache"
                );
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(persisted) => Some(persisted),
            Err(e) => {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "Persistent cache is corrupted, treating as empty"
                );
                Some(HashMap::new())
            }
        }
    }

    async fn save_persisted(&self, persisted: &PersistedEntries<P>) {
        let raw = match serde_json::to_string(persisted) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize product cache");
                return;
            }
        };

        if let Err(e) = self.store.set(&self.storage_key, raw).await {
            warn!(
                storage_key = %self.storage_key,
                error = %e,
                "Failed to write persistent cache"
            );
        }
    }

    /// Removes `key` from the persisted blob only if the persisted copy is
    /// itself expired. A write that landed after the memory copy expired
    /// is kept.
    async fn purge_persisted_if_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        let Some(mut persisted) = self.load_persisted().await else {
            return false;
        };
        let expired = persisted
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(self.ttl, now));
        if !expired {
            return false;
        }
        persisted.remove(key);
        self.save_persisted(&persisted).await;
        true
    }

    /// Removes one key from the persisted blob. Returns whether it was present.
    async fn remove_persisted(&self, key: &str) -> bool {
        let Some(mut persisted) = self.load_persisted().await else {
            return false;
        };
        if persisted.remove(key).is_none() {
            return false;
        }
        self.save_persisted(&persisted).await;
        true
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, Result};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const TTL: u64 = 24 * 60 * 60;

    fn cache_with(capacity: usize) -> (ProductCache<String>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ProductCache::new(store.clone(), capacity, TTL);
        (cache, store)
    }

    async fn persisted_keys(store: &MemoryStore) -> Vec<String> {
        let raw = store.get(DEFAULT_STORAGE_KEY).await.unwrap().unwrap_or_default();
        if raw.is_empty() {
            return Vec::new();
        }
        let persisted: PersistedEntries<String> = serde_json::from_str(&raw).unwrap();
        let mut keys: Vec<String> = persisted.into_keys().collect();
        keys.sort();
        keys
    }

    async fn write_persisted(store: &MemoryStore, entries: Vec<(&str, CacheEntry<String>)>) {
        let persisted: PersistedEntries<String> = entries
            .into_iter()
            .map(|(key, entry)| (key.to_string(), entry))
            .collect();
        store
            .set(DEFAULT_STORAGE_KEY, serde_json::to_string(&persisted).unwrap())
            .await
            .unwrap();
    }

    /// Store whose operations can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(CacheError::Storage("store unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<()> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, store) = cache_with(10);

        cache.set_product("3017620422003", "hazelnut spread".to_string()).await;

        assert_eq!(
            cache.get_product("3017620422003").await,
            Some("hazelnut spread".to_string())
        );
        assert_eq!(persisted_keys(&store).await, vec!["3017620422003"]);

        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.memory_size, 1);
        assert_eq!(stats.total_access_count, 2);
        assert_eq!(stats.counters.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _) = cache_with(10);

        assert_eq!(cache.get_product("missing").await, None);
        assert_eq!(cache.get_cache_stats().await.counters.misses, 1);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_entry() {
        let (cache, _) = cache_with(10);

        cache.set_product("a", "v1".to_string()).await;
        cache.get_product("a").await;
        cache.set_product("a", "v2".to_string()).await;

        assert_eq!(cache.get_cache_stats().await.total_access_count, 1);
        assert_eq!(cache.get_product("a").await, Some("v2".to_string()));
        assert_eq!(cache.get_cache_stats().await.memory_size, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_falls_back_to_persistent_tier() {
        let (cache, store) = cache_with(3);

        for key in ["1", "2", "3", "4"] {
            cache.set_product(key, format!("product {}", key)).await;
        }

        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.memory_size, 3);
        assert_eq!(stats.counters.evictions, 1);
        assert!(!cache.memory.lock().await.entries.contains_key("1"));
        assert_eq!(persisted_keys(&store).await, vec!["1", "2", "3", "4"]);

        // Served from the persistent tier, promoted, evicting "2"
        assert_eq!(cache.get_product("1").await, Some("product 1".to_string()));
        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.memory_size, 3);
        assert_eq!(stats.counters.persistent_hits, 1);
        assert_eq!(stats.counters.memory_hits, 0);
        assert_eq!(stats.counters.evictions, 2);

        let memory = cache.memory.lock().await;
        assert!(memory.entries.contains_key("1"));
        assert!(!memory.entries.contains_key("2"));
    }

    #[tokio::test]
    async fn test_lru_touch_on_get() {
        let (cache, _) = cache_with(3);

        cache.set_product("key1", "v".to_string()).await;
        cache.set_product("key2", "v".to_string()).await;
        cache.set_product("key3", "v".to_string()).await;

        cache.get_product("key1").await;
        cache.set_product("key4", "v".to_string()).await;

        let memory = cache.memory.lock().await;
        assert!(memory.entries.contains_key("key1"));
        assert!(!memory.entries.contains_key("key2"));
    }

    #[tokio::test]
    async fn test_expired_persisted_entry_is_purged_on_read() {
        let (cache, store) = cache_with(10);
        let stale = CacheEntry::new_at("old".to_string(), Utc::now() - Duration::hours(25));
        let fresh = CacheEntry::new("new".to_string());
        write_persisted(&store, vec![("stale", stale), ("fresh", fresh)]).await;

        assert!(!cache.has_product("stale").await);
        // has_product is read-only
        assert_eq!(persisted_keys(&store).await, vec!["fresh", "stale"]);

        assert_eq!(cache.get_product("stale").await, None);
        assert_eq!(persisted_keys(&store).await, vec!["fresh"]);
        assert_eq!(cache.get_product("fresh").await, Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_expired_memory_entry_is_purged_on_read() {
        let store = Arc::new(MemoryStore::new());
        let cache: ProductCache<String> = ProductCache::new(store.clone(), 10, 1);

        cache.set_product("short", "lived".to_string()).await;
        assert!(cache.has_product("short").await);

        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

        assert!(!cache.has_product("short").await);
        assert_eq!(cache.get_product("short").await, None);
        assert_eq!(cache.get_cache_stats().await.memory_size, 0);
        assert!(persisted_keys(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_has_product_does_not_promote() {
        let (cache, store) = cache_with(10);
        write_persisted(&store, vec![("p", CacheEntry::new("x".to_string()))]).await;

        assert!(cache.has_product("p").await);
        assert!(!cache.has_product("q").await);
        assert_eq!(cache.get_cache_stats().await.memory_size, 0);
    }

    #[tokio::test]
    async fn test_invalidate_removes_both_tiers() {
        let (cache, store) = cache_with(10);

        cache.set_product("a", "v".to_string()).await;
        cache.set_product("b", "v".to_string()).await;
        cache.invalidate_product("a", "photo updated").await;
        cache.invalidate_product("a", "photo updated").await;

        assert!(!cache.has_product("a").await);
        assert_eq!(cache.get_product("a").await, None);
        assert_eq!(persisted_keys(&store).await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let (cache, store) = cache_with(10);

        cache.set_product("a", "v".to_string()).await;
        cache.set_product("b", "v".to_string()).await;
        cache.clear_cache().await;

        assert_eq!(cache.get_cache_stats().await.memory_size, 0);
        assert!(cache.memory.lock().await.lru.keys().next().is_none());
        assert!(store.is_empty().await);
        assert_eq!(cache.get_product("a").await, None);
        assert_eq!(cache.get_product("b").await, None);
    }

    #[tokio::test]
    async fn test_initialize_seeds_memory_by_last_accessed() {
        let (cache, store) = cache_with(2);
        let now = Utc::now();

        let mut oldest = CacheEntry::new_at("o".to_string(), now - Duration::hours(3));
        oldest.last_accessed = now - Duration::hours(3);
        let mut middle = CacheEntry::new_at("m".to_string(), now - Duration::hours(3));
        middle.last_accessed = now - Duration::hours(2);
        let mut newest = CacheEntry::new_at("n".to_string(), now - Duration::hours(3));
        newest.last_accessed = now - Duration::hours(1);
        let expired = CacheEntry::new_at("e".to_string(), now - Duration::hours(30));

        write_persisted(
            &store,
            vec![
                ("newest", newest),
                ("oldest", oldest),
                ("expired", expired),
                ("middle", middle),
            ],
        )
        .await;

        assert_eq!(cache.initialize().await, 2);
        assert_eq!(persisted_keys(&store).await, vec!["middle", "newest", "oldest"]);

        let memory = cache.memory.lock().await;
        assert_eq!(memory.lru.keys().collect::<Vec<_>>(), vec!["middle", "newest"]);
    }

    #[tokio::test]
    async fn test_corrupted_blob_reads_as_empty() {
        let (cache, store) = cache_with(10);
        store
            .set(DEFAULT_STORAGE_KEY, "{definitely not json".to_string())
            .await
            .unwrap();

        assert_eq!(cache.initialize().await, 0);
        assert_eq!(cache.get_product("anything").await, None);
        assert!(!cache.has_product("anything").await);

        // The next write replaces the corrupted blob
        cache.set_product("a", "v".to_string()).await;
        assert_eq!(persisted_keys(&store).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_store_failures_are_absorbed() {
        let store = Arc::new(FlakyStore::default());
        let cache: ProductCache<String> = ProductCache::new(store.clone(), 10, TTL);

        cache.set_product("before", "v".to_string()).await;
        store.fail(true);

        // Memory tier keeps working while the store is down
        cache.set_product("during", "v".to_string()).await;
        assert_eq!(cache.get_product("during").await, Some("v".to_string()));
        assert_eq!(cache.get_product("unknown").await, None);
        assert!(!cache.has_product("unknown").await);
        cache.invalidate_product("before", "test").await;
        cache.clear_cache().await;
        assert_eq!(cache.initialize().await, 0);
        assert_eq!(cache.sweep_expired().await, SweepReport::default());

        // Failed read-modify-writes never clobbered the blob
        store.fail(false);
        let raw = store.inner.get(DEFAULT_STORAGE_KEY).await.unwrap().unwrap();
        let persisted: PersistedEntries<String> = serde_json::from_str(&raw).unwrap();
        assert!(persisted.contains_key("before"));
        assert!(!persisted.contains_key("during"));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = Arc::new(MemoryStore::new());
        let cache: ProductCache<String> = ProductCache::new(store.clone(), 10, 3600);
        let now = Utc::now();
        write_persisted(
            &store,
            vec![
                ("gone", CacheEntry::new_at("x".to_string(), now - Duration::hours(2))),
                ("kept", CacheEntry::new_at("y".to_string(), now)),
            ],
        )
        .await;
        let stale = CacheEntry::new_at("z".to_string(), now - Duration::hours(2));
        cache.memory.lock().await.insert("stale".to_string(), stale);

        let report = cache.sweep_expired().await;
        assert_eq!(
            report,
            SweepReport {
                memory_removed: 1,
                persistent_removed: 1,
            }
        );
        assert_eq!(report.total(), 2);
        assert_eq!(persisted_keys(&store).await, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_get_or_fetch() {
        let (cache, _) = cache_with(10);

        let fetched: std::result::Result<_, String> = cache
            .get_or_fetch("a", || async { Ok(Some("fetched".to_string())) })
            .await;
        assert_eq!(fetched, Ok(Some("fetched".to_string())));

        // Second call is served from cache; the fetcher must not run
        let cached: std::result::Result<_, String> = cache
            .get_or_fetch("a", || async { Err("fetcher should not run".to_string()) })
            .await;
        assert_eq!(cached, Ok(Some("fetched".to_string())));

        let missing: std::result::Result<_, String> =
            cache.get_or_fetch("b", || async { Ok(None) }).await;
        assert_eq!(missing, Ok(None));
        assert!(!cache.has_product("b").await);

        let failed: std::result::Result<Option<String>, String> = cache
            .get_or_fetch("c", || async { Err("offline".to_string()) })
            .await;
        assert_eq!(failed, Err("offline".to_string()));
    }

    #[tokio::test]
    async fn test_custom_storage_key() {
        let store = Arc::new(MemoryStore::new());
        let cache: ProductCache<String> =
            ProductCache::new(store.clone(), 10, TTL).with_storage_key("scans_v2");

        cache.set_product("a", "v".to_string()).await;

        assert_eq!(cache.storage_key(), "scans_v2");
        assert!(store.get("scans_v2").await.unwrap().is_some());
        assert!(store.get(DEFAULT_STORAGE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (cache, store) = cache_with(0);

        cache.set_product("a", "v".to_string()).await;
        cache.set_product("b", "v".to_string()).await;

        assert_eq!(cache.get_cache_stats().await.memory_size, 1);
        assert_eq!(cache.ttl(), Duration::hours(24));
        assert_eq!(persisted_keys(&store).await, vec!["a", "b"]);
    }

    /// Store whose next `get` parks until released, once armed.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl KeyValueStore for GatedStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_expired_read_keeps_concurrent_fresh_write() {
        let store = Arc::new(GatedStore::default());
        let cache = Arc::new(ProductCache::new(store.clone(), 10, TTL));

        let stale = CacheEntry::new_at("stale".to_string(), Utc::now() - Duration::hours(25));
        write_persisted(&store.inner, vec![("k", stale.clone())]).await;
        cache.memory.lock().await.insert("k".to_string(), stale);

        // Hold the persistence lock inside a parked store read
        store.armed.store(true, Ordering::SeqCst);
        let holder = tokio::spawn({
            let cache = cache.clone();
            async move { cache.invalidate_product("other", "hold").await }
        });
        store.entered.notified().await;

        // The writer queues on the lock first, then the reader finds the
        // expired memory copy and queues behind it
        let writer = tokio::spawn({
            let cache = cache.clone();
            async move { cache.set_product("k", "fresh".to_string()).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let reader = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_product("k").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        store.release.notify_one();
        holder.await.unwrap();
        writer.await.unwrap();
        assert_eq!(reader.await.unwrap(), None);

        assert_eq!(persisted_keys(&store.inner).await, vec!["k"]);
        assert!(cache.memory.lock().await.entries.contains_key("k"));
        assert_eq!(cache.get_product("k").await, Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_initialize_never_evicts_resident_entries() {
        let (cache, store) = cache_with(2);
        let now = Utc::now();

        let mut older = CacheEntry::new_at("o".to_string(), now - Duration::hours(3));
        older.last_accessed = now - Duration::hours(3);
        let mut newer = CacheEntry::new_at("n".to_string(), now - Duration::hours(3));
        newer.last_accessed = now - Duration::hours(1);
        write_persisted(&store, vec![("older", older), ("newer", newer)]).await;

        cache.set_product("live", "l".to_string()).await;
        assert_eq!(cache.initialize().await, 2);

        let memory = cache.memory.lock().await;
        assert_eq!(memory.lru.keys().collect::<Vec<_>>(), vec!["live", "newer"]);
        assert_eq!(memory.counters.evictions, 0);
    }
}
