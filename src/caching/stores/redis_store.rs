//! # Redis Cache Store
//!
//! Distributed cache tier backed by Redis.
//!
//! The store never turns a Redis problem into an error for the caller. Every
//! operation runs under `operation_timeout`; a failure or timeout marks the
//! link down and the operation reports `Unavailable`. While the link is down
//! operations short-circuit to `Unavailable` without touching the network,
//! until `reconnect_backoff` has passed. The first operation after that window
//! attempts one reconnect, and concurrent callers do not pile on.

use super::{DistributedCache, TierLookup, TierWrite};
use crate::caching::key::CacheKey;
use crate::caching::{CacheError, CacheResult};
use crate::core::config::RedisConfig;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Redis tier statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedisCacheStats {
    pub available: bool,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub skipped: u64,
    pub reconnects: u64,
}

enum Link {
    Up(ConnectionManager),
    /// `retry_at == None` means no attempt was made yet
    Down { retry_at: Option<Instant> },
}

/// Redis cache implementation
pub struct RedisCache {
    config: RedisConfig,
    client: Client,
    link: Mutex<Link>,
    reconnecting: AtomicBool,

    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    reconnects: AtomicU64,
}

/// Clears the reconnect flag even when the reconnecting future is dropped
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RedisCache {
    /// Create a new Redis cache without connecting
    ///
    /// Only the URL is checked here. Call [`RedisCache::probe`] at startup to
    /// establish the link, otherwise the first operation connects lazily.
    pub fn new(config: RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| CacheError::Configuration {
            message: format!("invalid redis url '{}': {}", config.url, e),
        })?;

        Ok(Self {
            config,
            client,
            link: Mutex::new(Link::Down { retry_at: None }),
            reconnecting: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        })
    }

    /// Connect and PING once; on failure the tier stays dark for `reconnect_backoff`
    pub async fn probe(&self) -> CacheResult<()> {
        match self.reconnect().await {
            Ok(()) => {
                info!(url = %self.config.url, "Redis cache connected");
                Ok(())
            }
            Err(e) => {
                warn!(
                    url = %self.config.url,
                    error = %e,
                    "Redis cache unavailable at startup, continuing with local cache only"
                );
                Err(e)
            }
        }
    }

    /// Establish a fresh connection
    ///
    /// Returns `Unavailable` immediately when another task is already reconnecting.
    pub async fn reconnect(&self) -> CacheResult<()> {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Unavailable);
        }
        let _guard = ReconnectGuard(&self.reconnecting);

        self.reconnects.fetch_add(1, Ordering::Relaxed);
        match self.connect().await {
            Ok(conn) => {
                *self.link.lock() = Link::Up(conn);
                debug!("Redis link established");
                Ok(())
            }
            Err(e) => {
                self.mark_down(&e.to_string());
                Err(e)
            }
        }
    }

    async fn connect(&self) -> CacheResult<ConnectionManager> {
        let mut conn = timeout(
            self.config.connection_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .map_err(|_| CacheError::Timeout)??;

        let _: String = timeout(
            self.config.operation_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| CacheError::Timeout)??;

        Ok(conn)
    }

    /// A usable connection, reconnecting if the backoff window has passed
    async fn connection(&self) -> Option<ConnectionManager> {
        let retry_due = {
            let link = self.link.lock();
            match &*link {
                Link::Up(conn) => return Some(conn.clone()),
                Link::Down { retry_at } => retry_at.map_or(true, |at| Instant::now() >= at),
            }
        };

        if !retry_due {
            return None;
        }
        self.reconnect().await.ok()?;
        self.current()
    }

    fn current(&self) -> Option<ConnectionManager> {
        match &*self.link.lock() {
            Link::Up(conn) => Some(conn.clone()),
            Link::Down { .. } => None,
        }
    }

    fn mark_down(&self, reason: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let retry_at = Some(Instant::now() + self.config.reconnect_backoff);

        let mut link = self.link.lock();
        if matches!(*link, Link::Up(_)) {
            warn!(
                reason,
                backoff = ?self.config.reconnect_backoff,
                "Redis cache marked unavailable"
            );
        }
        *link = Link::Down { retry_at };
    }

    fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> RedisCacheStats {
        RedisCacheStats {
            available: self.is_available(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    // Redis rejects an expiry of zero; round sub-second TTLs up.
    ttl.as_secs().max(1)
}

/// PTTL reply to a remaining TTL; negative replies mean no expiry or no key
fn remaining_ttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> TierLookup {
        let Some(mut conn) = self.connection().await else {
            self.skip();
            return TierLookup::Unavailable;
        };

        let mut pipe = redis::pipe();
        pipe.atomic().get(key.as_str()).pttl(key.as_str());

        match timeout(
            self.config.operation_timeout,
            pipe.query_async::<_, (Option<Vec<u8>>, i64)>(&mut conn),
        )
        .await
        {
            Ok(Ok((Some(value), pttl))) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                TierLookup::Hit {
                    value: Bytes::from(value),
                    remaining: remaining_ttl(pttl),
                }
            }
            Ok(Ok((None, _))) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                TierLookup::Miss
            }
            Ok(Err(e)) => {
                self.mark_down(&e.to_string());
                TierLookup::Unavailable
            }
            Err(_) => {
                self.mark_down("GET timed out");
                TierLookup::Unavailable
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: &Bytes, ttl: Duration) -> TierWrite {
        let Some(mut conn) = self.connection().await else {
            self.skip();
            return TierWrite::Unavailable;
        };

        match timeout(
            self.config.operation_timeout,
            conn.set_ex::<_, _, ()>(key.as_str(), value.as_ref(), ttl_seconds(ttl)),
        )
        .await
        {
            Ok(Ok(())) => TierWrite::Done,
            Ok(Err(e)) => {
                self.mark_down(&e.to_string());
                TierWrite::Unavailable
            }
            Err(_) => {
                self.mark_down("SET timed out");
                TierWrite::Unavailable
            }
        }
    }

    async fn delete(&self, key: &CacheKey) -> TierWrite {
        let Some(mut conn) = self.connection().await else {
            self.skip();
            return TierWrite::Unavailable;
        };

        match timeout(self.config.operation_timeout, conn.del::<_, i64>(key.as_str())).await {
            Ok(Ok(_)) => TierWrite::Done,
            Ok(Err(e)) => {
                self.mark_down(&e.to_string());
                TierWrite::Unavailable
            }
            Err(_) => {
                self.mark_down("DEL timed out");
                TierWrite::Unavailable
            }
        }
    }

    fn is_available(&self) -> bool {
        matches!(*self.link.lock(), Link::Up(_))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::key::KeyBuilder;

    fn unreachable_config() -> RedisConfig {
        RedisConfig {
            enabled: true,
            // Port 1 on loopback refuses connections immediately.
            url: "redis://127.0.0.1:1".to_string(),
            connection_timeout: Duration::from_millis(200),
            operation_timeout: Duration::from_millis(100),
            reconnect_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        assert!(matches!(
            RedisCache::new(config),
            Err(CacheError::Configuration { .. })
        ));
    }

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn test_pttl_reply_to_remaining_ttl() {
        assert_eq!(remaining_ttl(1500), Some(Duration::from_millis(1500)));
        assert_eq!(remaining_ttl(-1), None);
        assert_eq!(remaining_ttl(-2), None);
    }

    #[tokio::test]
    async fn test_unreachable_redis_reports_unavailable() {
        let cache = RedisCache::new(unreachable_config()).unwrap();
        let key = KeyBuilder::default().document("/documents/1");

        assert!(cache.probe().await.is_err());
        assert!(!cache.is_available());

        assert_eq!(cache.get(&key).await, TierLookup::Unavailable);
        assert_eq!(
            cache.set(&key, &Bytes::from_static(b"v"), Duration::from_secs(5)).await,
            TierWrite::Unavailable
        );
        assert_eq!(cache.delete(&key).await, TierWrite::Unavailable);

        // Inside the backoff window nothing is retried.
        let stats = cache.stats();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.skipped, 3);
    }
}
