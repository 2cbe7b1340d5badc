//! # Cache Stores Module
//!
//! The in-process tier ([`LocalCache`]) and the distributed tier
//! ([`RedisCache`]), plus the [`DistributedCache`] seam the coordinator talks
//! to so the Redis tier can be swapped for a fake in tests.

pub mod memory;
pub mod redis_store;

pub use memory::{LocalCache, LocalCacheStats};
pub use redis_store::{RedisCache, RedisCacheStats};

use crate::caching::key::CacheKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload, opaque to the cache
    pub value: Bytes,

    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Check if the entry is expired at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Get time until expiration
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Outcome of a distributed-tier read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierLookup {
    /// `remaining` is the entry's time left in the tier, when the tier knows it
    Hit {
        value: Bytes,
        remaining: Option<Duration>,
    },
    Miss,
    /// The tier could not be consulted; treat as a miss
    Unavailable,
}

/// Outcome of a distributed-tier write or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierWrite {
    Done,
    Unavailable,
}

/// A shared cache tier that may be unreachable at any time
///
/// Implementations must not block past their own operation timeout and must
/// never panic on connection loss.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Get a value
    async fn get(&self, key: &CacheKey) -> TierLookup;

    /// Store a value with a TTL
    async fn set(&self, key: &CacheKey, value: &Bytes, ttl: Duration) -> TierWrite;

    /// Remove a value; removing an absent key is `Done`
    async fn delete(&self, key: &CacheKey) -> TierWrite;

    /// Whether the tier is currently believed reachable
    fn is_available(&self) -> bool;

    /// Name used in logs and metric labels
    fn name(&self) -> &'static str {
        "distributed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_expiry() {
        let entry = CacheEntry::new(Bytes::from_static(b"v"), Duration::from_millis(50));
        assert!(!entry.is_expired());
        assert!(entry.remaining_ttl() <= Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl(), Duration::ZERO);
    }
}
