//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A cached product together with its freshness and access metadata.
///
/// Serialized with camelCase field names and ISO-8601 timestamps, which is
/// the per-entry shape of the persisted cache blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<P> {
    /// The cached product
    pub product: P,
    /// Creation or refresh time, used for TTL expiration
    pub timestamp: DateTime<Utc>,
    /// Number of reads and writes that touched this entry
    pub access_count: u64,
    /// Time of the most recent read or write
    pub last_accessed: DateTime<Utc>,
}

impl<P> CacheEntry<P> {
    // == Constructor ==
    /// Creates a fresh entry stamped with the current time.
    pub fn new(product: P) -> Self {
        Self::new_at(product, Utc::now())
    }

    /// Creates a fresh entry stamped with `now`.
    pub fn new_at(product: P, now: DateTime<Utc>) -> Self {
        Self {
            product,
            timestamp: now,
            access_count: 1,
            last_accessed: now,
        }
    }

    // == Is Expired ==
    /// Checks if the entry is older than `ttl`.
    ///
    /// An entry is expired strictly after the TTL has elapsed; an entry
    /// whose age equals the TTL is still fresh.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Utc::now())
    }

    /// Same as [`CacheEntry::is_expired`] against an explicit clock reading.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > ttl
    }

    // == Record Access ==
    /// Bumps the access count and moves `last_accessed` to `now`.
    pub fn record_access_at(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}
