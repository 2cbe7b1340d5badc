//! # Cache Coordinator
//!
//! Coordinates the local and distributed tiers behind one read-through
//! interface. None of its operations can fail: a distributed-tier outage is
//! logged, counted and treated as a miss (on reads) or skipped (on writes).
//!
//! Fills are guarded by invalidation epochs. A reader takes a [`FillTicket`]
//! before it goes to the origin, and the value it brings back is only stored
//! if no invalidation of the same key class ran in the meantime. Without that
//! a read racing an update could write the pre-update body back after the
//! update's invalidation.

use super::key::{CacheKey, KeyClass};
use super::stores::{DistributedCache, LocalCache, LocalCacheStats, TierLookup, TierWrite};
use crate::observability::metrics;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// TTL applied per key class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub document: Duration,
    pub listing: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            document: Duration::from_secs(300),
            listing: Duration::from_secs(60),
        }
    }
}

impl TtlPolicy {
    pub fn ttl_for(&self, class: KeyClass) -> Duration {
        match class {
            KeyClass::Document => self.document,
            KeyClass::Listing => self.listing,
        }
    }
}

/// Combined cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub local: LocalCacheStats,
    pub local_hits: u64,
    pub distributed_hits: u64,
    pub misses: u64,
    pub distributed_unavailable: u64,
    pub populations: u64,
    pub discarded_fills: u64,
    pub invalidations: u64,
    pub distributed_available: Option<bool>,
}

impl CacheStats {
    /// Fraction of lookups answered by either tier
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.distributed_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Invalidation counts per key class
#[derive(Debug, Default)]
struct Epochs {
    document: u64,
    listing: u64,
}

impl Epochs {
    fn of(&self, class: KeyClass) -> u64 {
        match class {
            KeyClass::Document => self.document,
            KeyClass::Listing => self.listing,
        }
    }

    fn bump(&mut self, class: KeyClass) {
        match class {
            KeyClass::Document => self.document += 1,
            KeyClass::Listing => self.listing += 1,
        }
    }
}

/// Epoch snapshot a fill is checked against before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    class: KeyClass,
    epoch: u64,
}

/// Read-through coordinator over the two cache tiers
pub struct CacheCoordinator {
    local: Arc<LocalCache>,
    distributed: Option<Arc<dyn DistributedCache>>,
    ttl: TtlPolicy,
    // Local-tier writes and deletes happen under this lock so an epoch
    // check and the write it guards cannot interleave with an invalidation.
    epochs: Mutex<Epochs>,

    local_hits: AtomicU64,
    distributed_hits: AtomicU64,
    misses: AtomicU64,
    distributed_unavailable: AtomicU64,
    populations: AtomicU64,
    discarded_fills: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheCoordinator {
    /// Create a coordinator; pass `None` to run with the local tier only
    pub fn new(
        local: Arc<LocalCache>,
        distributed: Option<Arc<dyn DistributedCache>>,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            local,
            distributed,
            ttl,
            epochs: Mutex::new(Epochs::default()),
            local_hits: AtomicU64::new(0),
            distributed_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            distributed_unavailable: AtomicU64::new(0),
            populations: AtomicU64::new(0),
            discarded_fills: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    /// Snapshot the invalidation epoch of `key`'s class
    ///
    /// Take the ticket before the origin call whose result will be passed to
    /// [`CacheCoordinator::populate_after`].
    pub fn fill_ticket(&self, key: &CacheKey) -> FillTicket {
        let class = key.class();
        FillTicket {
            class,
            epoch: self.epochs.lock().of(class),
        }
    }

    fn is_current(&self, ticket: FillTicket) -> bool {
        self.epochs.lock().of(ticket.class) == ticket.epoch
    }

    /// Write to the local tier unless `ticket` went stale
    fn set_local_if_current(&self, key: &CacheKey, value: Bytes, ttl: Duration, ticket: FillTicket) -> bool {
        let epochs = self.epochs.lock();
        if epochs.of(ticket.class) != ticket.epoch {
            return false;
        }
        self.local.set(key.clone(), value, ttl);
        true
    }

    /// Look a key up in the local tier, then the distributed tier
    ///
    /// A distributed hit is copied into the local tier for the shorter of
    /// its remaining time in the distributed tier and its class TTL. The copy
    /// is skipped if the key class was invalidated while the distributed read
    /// was in flight.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        if let Some(value) = self.local.get(key) {
            self.local_hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_lookup("local", "hit");
            debug!(key = %key, "Cache hit in local tier");
            return Some(value);
        }
        metrics::record_cache_lookup("local", "miss");

        if let Some(distributed) = &self.distributed {
            let ticket = self.fill_ticket(key);
            match distributed.get(key).await {
                TierLookup::Hit { value, remaining } => {
                    self.distributed_hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_lookup(distributed.name(), "hit");

                    let class_ttl = self.ttl.ttl_for(key.class());
                    let ttl = remaining.map_or(class_ttl, |left| left.min(class_ttl));
                    if !ttl.is_zero() && self.set_local_if_current(key, value.clone(), ttl, ticket) {
                        debug!(key = %key, tier = distributed.name(), ttl = ?ttl, "Cache hit, promoted to local tier");
                    }
                    return Some(value);
                }
                TierLookup::Miss => {
                    metrics::record_cache_lookup(distributed.name(), "miss");
                }
                TierLookup::Unavailable => {
                    self.distributed_unavailable.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_lookup(distributed.name(), "unavailable");
                    debug!(key = %key, tier = distributed.name(), "Distributed tier unavailable, treating as miss");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value in both tiers
    pub async fn populate(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        let ticket = self.fill_ticket(key);
        self.populate_after(key, value, ttl, ticket).await;
    }

    /// Store a value fetched after `ticket` was taken
    ///
    /// Nothing is stored, and `false` is returned, when the key's class was
    /// invalidated since the ticket was taken. A distributed write that loses
    /// the race with an invalidation is deleted again.
    pub async fn populate_after(&self, key: &CacheKey, value: Bytes, ttl: Duration, ticket: FillTicket) -> bool {
        if !self.set_local_if_current(key, value.clone(), ttl, ticket) {
            return self.discard_fill(key);
        }

        if let Some(distributed) = &self.distributed {
            match distributed.set(key, &value, ttl).await {
                TierWrite::Done if !self.is_current(ticket) => {
                    self.delete_distributed(key).await;
                    return self.discard_fill(key);
                }
                TierWrite::Done => {}
                TierWrite::Unavailable => {
                    self.distributed_unavailable.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, tier = distributed.name(), "Skipped distributed populate");
                }
            }
        }

        self.populations.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl = ?ttl, "Cached response");
        true
    }

    fn discard_fill(&self, key: &CacheKey) -> bool {
        self.discarded_fills.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Invalidated while in flight, not caching");
        false
    }

    /// Remove a key from both tiers
    pub async fn invalidate(&self, key: &CacheKey) {
        {
            let mut epochs = self.epochs.lock();
            epochs.bump(key.class());
            self.local.delete(key);
        }
        self.delete_distributed(key).await;

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        metrics::record_invalidation("document", 1);
        debug!(key = %key, "Invalidated cache entry");
    }

    /// Remove every cached listing and search page
    ///
    /// The local tier is swept by key class. The distributed tier has no
    /// enumeration, so only the listing keys this process knew about are
    /// deleted there; anything else expires with the listing TTL.
    pub async fn invalidate_listings(&self) -> usize {
        let removed = {
            let mut epochs = self.epochs.lock();
            epochs.bump(KeyClass::Listing);
            self.local.remove_matching(CacheKey::is_listing)
        };
        for key in &removed {
            self.delete_distributed(key).await;
        }

        self.invalidations
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        metrics::record_invalidation("listing", removed.len());
        if !removed.is_empty() {
            debug!(removed = removed.len(), "Invalidated cached listings");
        }
        removed.len()
    }

    async fn delete_distributed(&self, key: &CacheKey) {
        if let Some(distributed) = &self.distributed {
            if distributed.delete(key).await == TierWrite::Unavailable {
                self.distributed_unavailable.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    tier = distributed.name(),
                    "Distributed invalidation skipped, entry may be served until its TTL expires"
                );
            }
        }
    }

    /// Drop every entry of the local tier
    pub fn clear_local(&self) {
        self.local.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local: self.local.stats(),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            distributed_hits: self.distributed_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            distributed_unavailable: self.distributed_unavailable.load(Ordering::Relaxed),
            populations: self.populations.load(Ordering::Relaxed),
            discarded_fills: self.discarded_fills.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            distributed_available: self.distributed.as_ref().map(|d| d.is_available()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::key::KeyBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    /// HashMap-backed tier that can be switched off
    #[derive(Default)]
    struct FakeTier {
        entries: Mutex<HashMap<String, Bytes>>,
        remaining: Mutex<Option<Duration>>,
        down: AtomicBool,
    }

    #[async_trait]
    impl DistributedCache for FakeTier {
        async fn get(&self, key: &CacheKey) -> TierLookup {
            if self.down.load(Ordering::SeqCst) {
                return TierLookup::Unavailable;
            }
            match self.entries.lock().get(key.as_str()) {
                Some(v) => TierLookup::Hit {
                    value: v.clone(),
                    remaining: *self.remaining.lock(),
                },
                None => TierLookup::Miss,
            }
        }

        async fn set(&self, key: &CacheKey, value: &Bytes, _ttl: Duration) -> TierWrite {
            if self.down.load(Ordering::SeqCst) {
                return TierWrite::Unavailable;
            }
            self.entries.lock().insert(key.to_string(), value.clone());
            TierWrite::Done
        }

        async fn delete(&self, key: &CacheKey) -> TierWrite {
            if self.down.load(Ordering::SeqCst) {
                return TierWrite::Unavailable;
            }
            self.entries.lock().remove(key.as_str());
            TierWrite::Done
        }

        fn is_available(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }
    }

    fn coordinator(tier: Option<Arc<FakeTier>>) -> CacheCoordinator {
        let local = Arc::new(LocalCache::with_capacity(100));
        CacheCoordinator::new(
            local,
            tier.map(|t| t as Arc<dyn DistributedCache>),
            TtlPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_populate_then_lookup() {
        let cache = coordinator(None);
        let key = KeyBuilder::default().document("/documents/1");

        cache
            .populate(&key, Bytes::from_static(b"doc"), Duration::from_secs(60))
            .await;
        assert_eq!(cache.lookup(&key).await, Some(Bytes::from_static(b"doc")));

        cache.invalidate(&key).await;
        assert_eq!(cache.lookup(&key).await, None);

        let stats = cache.stats();
        assert_eq!(stats.local_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.distributed_available, None);
    }

    #[tokio::test]
    async fn test_distributed_hit_is_promoted() {
        let tier = Arc::new(FakeTier::default());
        let cache = coordinator(Some(tier.clone()));
        let key = KeyBuilder::default().document("/documents/1");

        tier.entries
            .lock()
            .insert(key.to_string(), Bytes::from_static(b"shared"));

        assert_eq!(cache.lookup(&key).await, Some(Bytes::from_static(b"shared")));
        assert_eq!(cache.local().get(&key), Some(Bytes::from_static(b"shared")));
        assert_eq!(cache.stats().distributed_hits, 1);
    }

    #[tokio::test]
    async fn test_unavailable_tier_degrades_to_local() {
        let tier = Arc::new(FakeTier::default());
        tier.down.store(true, Ordering::SeqCst);
        let cache = coordinator(Some(tier.clone()));
        let key = KeyBuilder::default().document("/documents/1");

        assert_eq!(cache.lookup(&key).await, None);
        cache
            .populate(&key, Bytes::from_static(b"doc"), Duration::from_secs(60))
            .await;
        assert_eq!(cache.lookup(&key).await, Some(Bytes::from_static(b"doc")));
        cache.invalidate(&key).await;
        assert_eq!(cache.local().get(&key), None);

        let stats = cache.stats();
        assert_eq!(stats.distributed_unavailable, 3);
        assert_eq!(stats.distributed_available, Some(false));
    }

    #[tokio::test]
    async fn test_invalidate_listings_sweeps_both_tiers() {
        let tier = Arc::new(FakeTier::default());
        let cache = coordinator(Some(tier.clone()));
        let keys = KeyBuilder::default();

        let doc = keys.document("/documents/1");
        let listing = keys.build(&Method::GET, "/documents", [("page", "1"), ("per_page", "10")], KeyClass::Listing);
        let search = keys.build(&Method::GET, "/search/title", [("term", "rust")], KeyClass::Listing);

        for key in [&doc, &listing, &search] {
            cache
                .populate(key, Bytes::from_static(b"x"), Duration::from_secs(60))
                .await;
        }

        assert_eq!(cache.invalidate_listings().await, 2);
        assert!(cache.lookup(&listing).await.is_none());
        assert!(cache.lookup(&search).await.is_none());
        assert!(cache.lookup(&doc).await.is_some());
        assert_eq!(tier.entries.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_promotion_keeps_distributed_remaining_ttl() {
        let tier = Arc::new(FakeTier::default());
        *tier.remaining.lock() = Some(Duration::from_millis(50));
        let cache = coordinator(Some(tier.clone()));
        let key = KeyBuilder::default().document("/documents/1");

        tier.entries
            .lock()
            .insert(key.to_string(), Bytes::from_static(b"shared"));
        assert!(cache.lookup(&key).await.is_some());
        tier.entries.lock().clear();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.local().get(&key), None);
    }

    #[tokio::test]
    async fn test_fill_started_before_invalidation_is_discarded() {
        let tier = Arc::new(FakeTier::default());
        let cache = coordinator(Some(tier.clone()));
        let key = KeyBuilder::default().document("/documents/1");

        let ticket = cache.fill_ticket(&key);
        cache.invalidate(&key).await;
        let stored = cache
            .populate_after(&key, Bytes::from_static(b"old"), Duration::from_secs(60), ticket)
            .await;

        assert!(!stored);
        assert_eq!(cache.lookup(&key).await, None);
        assert!(tier.entries.lock().is_empty());
        assert_eq!(cache.stats().discarded_fills, 1);

        let fresh = cache.fill_ticket(&key);
        assert!(
            cache
                .populate_after(&key, Bytes::from_static(b"new"), Duration::from_secs(60), fresh)
                .await
        );
        assert_eq!(cache.lookup(&key).await, Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_listing_fill_discarded_by_listing_sweep() {
        let cache = coordinator(None);
        let keys = KeyBuilder::default();
        let listing = keys.build(&Method::GET, "/documents", [("page", "1")], KeyClass::Listing);
        let doc = keys.document("/documents/1");

        let listing_ticket = cache.fill_ticket(&listing);
        let doc_ticket = cache.fill_ticket(&doc);
        cache.invalidate_listings().await;

        let ttl = Duration::from_secs(60);
        assert!(!cache.populate_after(&listing, Bytes::from_static(b"l"), ttl, listing_ticket).await);
        assert!(cache.populate_after(&doc, Bytes::from_static(b"d"), ttl, doc_ticket).await);
    }

    #[test]
    fn test_ttl_policy_by_class() {
        let policy = TtlPolicy {
            document: Duration::from_secs(10),
            listing: Duration::from_secs(2),
        };
        assert_eq!(policy.ttl_for(KeyClass::Document), Duration::from_secs(10));
        assert_eq!(policy.ttl_for(KeyClass::Listing), Duration::from_secs(2));
    }
}
