//! # In-Memory Cache Store
//!
//! Bounded in-process cache tier with LRU eviction and per-entry TTL.
//!
//! Expiry is enforced lazily on read: an expired entry is never served, it is
//! removed on the read that finds it. An optional background sweeper reclaims
//! expired entries nobody reads again.

use super::CacheEntry;
use crate::caching::key::CacheKey;
use crate::core::config::LocalCacheConfig;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// Local cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// In-process LRU cache tier
pub struct LocalCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    capacity: usize,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl LocalCache {
    /// Create a new local cache; a `max_entries` of zero is treated as one
    pub fn new(config: &LocalCacheConfig) -> Self {
        Self::with_capacity(config.max_entries)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get a live value, refreshing its recency
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Local cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, evicting the least recently used entry when full
    pub fn set(&self, key: CacheKey, value: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        let displaced = self.entries.lock().push(key.clone(), entry);

        // `push` also hands back the previous value of a replaced key.
        if let Some((evicted, _)) = displaced {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "Evicted least recently used entry");
            }
        }
    }

    /// Remove a key; returns whether it was present
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Remove every entry whose key matches `predicate`, returning the removed keys
    pub fn remove_matching<F>(&self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut entries = self.entries.lock();
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| predicate(*key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }
        doomed
    }

    /// Drop all expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Start a background task purging expired entries every `every`
    ///
    /// The task only holds a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Swept expired local cache entries");
                }
            }
        })
    }
}
