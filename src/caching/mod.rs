//! # Caching System Module
//!
//! Two-tier read-through cache sitting in front of the origin document API.
//!
//! ## Architecture
//! 1. **Cache Coordinator**: consults the local tier, then the distributed tier,
//!    promotes distributed hits, and fans populations and invalidations out to
//!    both tiers
//! 2. **Cache Stores**: an in-process LRU with per-entry TTL and a Redis tier
//! 3. **Key Builder**: deterministic keys from verb, path and sorted query
//!
//! Failures of the distributed tier never reach callers. They surface as
//! [`TierLookup::Unavailable`] / [`TierWrite::Unavailable`] results, which the
//! coordinator logs, counts and otherwise treats like a miss.
//!
//! ## Usage Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytes::Bytes;
//! use docproxy::caching::{CacheCoordinator, KeyBuilder, LocalCache, TtlPolicy};
//! use docproxy::core::config::LocalCacheConfig;
//!
//! # async fn demo() {
//! let local = Arc::new(LocalCache::new(&LocalCacheConfig::default()));
//! let cache = CacheCoordinator::new(local, None, TtlPolicy::default());
//!
//! let key = KeyBuilder::default().document("/documents/123");
//! cache.populate(&key, Bytes::from_static(b"{}"), Duration::from_secs(300)).await;
//! assert!(cache.lookup(&key).await.is_some());
//! # }
//! ```

pub mod coordinator;
pub mod key;
pub mod stores;

pub use coordinator::{CacheCoordinator, CacheStats, FillTicket, TtlPolicy};
pub use key::{CacheKey, KeyBuilder, KeyClass};
pub use stores::{
    CacheEntry, DistributedCache, LocalCache, LocalCacheStats, RedisCache, RedisCacheStats,
    TierLookup, TierWrite,
};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
///
/// These only appear on the construction and maintenance paths of the stores
/// (opening a client, probing, reconnecting). Per-request operations report
/// tier health through [`TierLookup`] and [`TierWrite`] instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}
