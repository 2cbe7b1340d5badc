//! # Request Pipeline
//!
//! The two flows every document operation goes through.
//!
//! Reads: cache lookup, and on a miss gate permit, origin call, permit
//! release, decode, then populate. Failed calls and bodies that do not decode
//! are never cached. A fill is dropped if the key was invalidated while its
//! origin call was in flight.
//!
//! Mutations: gate permit, origin call, permit release, then invalidate the
//! affected document key and every cached listing. Mutations never populate.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::caching::{CacheCoordinator, CacheKey};
use crate::core::error::ProxyResult;
use crate::observability::metrics;
use crate::protocols::http::{OriginClient, OriginRequest, OriginResponse};
use crate::traffic::ConcurrencyGate;

#[derive(Clone)]
pub struct RequestPipeline {
    cache: Arc<CacheCoordinator>,
    gate: Arc<ConcurrencyGate>,
    origin: Arc<OriginClient>,
}

impl RequestPipeline {
    pub fn new(
        cache: Arc<CacheCoordinator>,
        gate: Arc<ConcurrencyGate>,
        origin: Arc<OriginClient>,
    ) -> Self {
        Self { cache, gate, origin }
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Serve a read from cache, falling back to one origin call
    ///
    /// `decode` runs on every body before it is returned, and an origin body
    /// is only cached once it decoded.
    pub async fn read<T, F>(&self, key: &CacheKey, request: &OriginRequest, ttl: Duration, decode: F) -> ProxyResult<T>
    where
        F: Fn(&[u8]) -> ProxyResult<T>,
    {
        if let Some(cached) = self.cache.lookup(key).await {
            match decode(&cached) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(key).await;
                }
            }
        }

        debug!(key = %key, endpoint = request.endpoint, "Cache miss, calling origin");
        let ticket = self.cache.fill_ticket(key);
        let response = self.call_origin(request).await?;
        let value = decode(&response.body).map_err(|e| {
            metrics::record_error(&e);
            e
        })?;

        self.cache.populate_after(key, response.body, ttl, ticket).await;
        Ok(value)
    }

    /// Perform a mutation and drop whatever it made stale
    pub async fn mutate(&self, request: &OriginRequest, stale: Option<&CacheKey>) -> ProxyResult<OriginResponse> {
        let response = self.call_origin(request).await?;

        if let Some(key) = stale {
            self.cache.invalidate(key).await;
        }
        self.cache.invalidate_listings().await;
        Ok(response)
    }

    /// One origin call while holding a gate permit
    ///
    /// The permit is released before the caller touches the cache again.
    async fn call_origin(&self, request: &OriginRequest) -> ProxyResult<OriginResponse> {
        let result = match self.gate.acquire().await {
            Ok(permit) => {
                let result = self.origin.call(request).await;
                debug!(endpoint = request.endpoint, held_ms = permit.held_for().as_millis() as u64, "Releasing gate permit");
                drop(permit);
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            metrics::record_error(e);
        }
        result
    }
}
