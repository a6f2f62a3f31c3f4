//! Cache Statistics Module
//!
//! Memory-tier introspection plus lifetime hit, miss and eviction counters.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheEntry;

// == Access Counters ==
/// Lifetime counters of cache lookups and evictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCounters {
    /// Reads served from the memory tier
    pub memory_hits: u64,
    /// Reads served from the persistent tier (and promoted)
    pub persistent_hits: u64,
    /// Reads that found nothing fresh in either tier
    pub misses: u64,
    /// Memory entries dropped by the LRU policy
    pub evictions: u64,
}

impl AccessCounters {
    // == Constructor ==
    /// Creates counters all at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the hit rate across both tiers.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persistent_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_persistent_hit(&mut self) {
        self.persistent_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }
}

// == Cache Stats ==
/// Snapshot of the memory tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of entries resident in memory
    pub memory_size: usize,
    /// Sum of `access_count` over resident entries
    pub total_access_count: u64,
    /// Timestamp of the oldest resident entry
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Timestamp of the newest resident entry
    pub newest_entry: Option<DateTime<Utc>>,
    /// Lifetime lookup counters
    #[serde(flatten)]
    pub counters: AccessCounters,
}

impl CacheStats {
    /// Builds a snapshot from resident entries and the current counters.
    pub fn from_entries<'a, P: 'a>(
        entries: impl IntoIterator<Item = &'a CacheEntry<P>>,
        counters: AccessCounters,
    ) -> Self {
        let mut stats = Self {
            counters,
            ..Self::default()
        };

        for entry in entries {
            stats.memory_size += 1;
            stats.total_access_count += entry.access_count;
            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(oldest) => oldest.min(entry.timestamp),
                None => entry.timestamp,
            });
            stats.newest_entry = Some(match stats.newest_entry {
                Some(newest) => newest.max(entry.timestamp),
                None => entry.timestamp,
            });
        }

        stats
    }

    /// Convenience passthrough to [`AccessCounters::hit_rate`].
    pub fn hit_rate(&self) -> f64 {
        self.counters.hit_rate()
    }
}
