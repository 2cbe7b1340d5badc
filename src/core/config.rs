//! # Configuration Module
//!
//! This module holds the proxy configuration and its loading pipeline.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (durations written as `"30s"`, `"5m"`)
//! - Environment variable overrides (`DOCPROXY_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProxyError, ProxyResult};

/// Main proxy configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Origin document API settings
    pub origin: OriginConfig,

    /// Concurrency gate settings
    pub gate: GateConfig,

    /// Two-tier cache settings
    pub cache: CacheConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Load configuration from a YAML file, apply env overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without validating it
    pub fn from_yaml(content: &str) -> ProxyResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProxyError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> ProxyResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Variables follow the pattern `DOCPROXY_<SECTION>_<FIELD>`, for example
    /// `DOCPROXY_ORIGIN_BASE_URL` or `DOCPROXY_CACHE_DOCUMENT_TTL=2m`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ProxyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DOCPROXY_ORIGIN_BASE_URL") {
            self.origin.base_url = url;
        }
        if let Some(timeout) = lookup("DOCPROXY_ORIGIN_REQUEST_TIMEOUT") {
            self.origin.request_timeout = parse_duration("DOCPROXY_ORIGIN_REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(max) = lookup("DOCPROXY_GATE_MAX_CONCURRENT_REQUESTS") {
            self.gate.max_concurrent_requests = max.parse().map_err(|e| {
                ProxyError::config(format!("Invalid DOCPROXY_GATE_MAX_CONCURRENT_REQUESTS: {}", e))
            })?;
        }
        if let Some(timeout) = lookup("DOCPROXY_GATE_ACQUIRE_TIMEOUT") {
            self.gate.acquire_timeout = Some(parse_duration("DOCPROXY_GATE_ACQUIRE_TIMEOUT", &timeout)?);
        }
        if let Some(ttl) = lookup("DOCPROXY_CACHE_DOCUMENT_TTL") {
            self.cache.document_ttl = parse_duration("DOCPROXY_CACHE_DOCUMENT_TTL", &ttl)?;
        }
        if let Some(ttl) = lookup("DOCPROXY_CACHE_LISTING_TTL") {
            self.cache.listing_ttl = parse_duration("DOCPROXY_CACHE_LISTING_TTL", &ttl)?;
        }
        if let Some(entries) = lookup("DOCPROXY_CACHE_LOCAL_MAX_ENTRIES") {
            self.cache.local.max_entries = entries.parse().map_err(|e| {
                ProxyError::config(format!("Invalid DOCPROXY_CACHE_LOCAL_MAX_ENTRIES: {}", e))
            })?;
        }
        if let Some(url) = lookup("DOCPROXY_CACHE_REDIS_URL") {
            self.cache.redis.url = url;
        }
        if let Some(enabled) = lookup("DOCPROXY_CACHE_REDIS_ENABLED") {
            self.cache.redis.enabled = enabled.parse().map_err(|e| {
                ProxyError::config(format!("Invalid DOCPROXY_CACHE_REDIS_ENABLED: {}", e))
            })?;
        }
        if let Some(filter) = lookup("DOCPROXY_LOG_FILTER") {
            self.observability.log_filter = filter;
        }
        if let Some(json) = lookup("DOCPROXY_LOG_JSON") {
            self.observability.json_logs = json
                .parse()
                .map_err(|e| ProxyError::config(format!("Invalid DOCPROXY_LOG_JSON: {}", e)))?;
        }

        Ok(())
    }

    /// Configuration validation with all problems reported together
    pub fn validate(&self) -> ProxyResult<()> {
        let mut errors = Vec::new();

        match Url::parse(&self.origin.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!("origin.base_url has unsupported scheme '{}'", url.scheme())),
            Err(e) => errors.push(format!("origin.base_url is not a valid URL: {}", e)),
        }

        if self.origin.request_timeout.is_zero() {
            errors.push("origin.request_timeout must be greater than 0".to_string());
        }

        if self.gate.max_concurrent_requests == 0 {
            errors.push("gate.max_concurrent_requests must be greater than 0".to_string());
        }

        if matches!(self.gate.acquire_timeout, Some(t) if t.is_zero()) {
            errors.push("gate.acquire_timeout must be greater than 0".to_string());
        }

        if self.cache.document_ttl.as_secs() == 0 {
            errors.push("cache.document_ttl must be at least 1s".to_string());
        }

        if self.cache.listing_ttl.as_secs() == 0 {
            errors.push("cache.listing_ttl must be at least 1s".to_string());
        }

        if self.cache.local.max_entries == 0 {
            errors.push("cache.local.max_entries must be greater than 0".to_string());
        }

        if self.cache.max_key_length < 64 {
            errors.push("cache.max_key_length must be at least 64".to_string());
        }

        if self.cache.redis.enabled {
            if let Err(e) = Url::parse(&self.cache.redis.url) {
                errors.push(format!("cache.redis.url is not a valid URL: {}", e));
            }
            if self.cache.redis.operation_timeout.is_zero() {
                errors.push("cache.redis.operation_timeout must be greater than 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::config(errors.join("; ")))
        }
    }
}

fn parse_duration(name: &str, value: &str) -> ProxyResult<Duration> {
    humantime::parse_duration(value).map_err(|e| ProxyError::config(format!("Invalid {}: {}", name, e)))
}

/// Origin document API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the document API
    pub base_url: String,

    /// Fixed per-call timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent on every call
    pub user_agent: String,

    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("docproxy/", env!("CARGO_PKG_VERSION")).to_string(),
            pool_max_idle_per_host: 20,
        }
    }
}

/// Concurrency gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum simultaneous in-flight origin calls
    pub max_concurrent_requests: usize,

    /// How long a request may wait for a slot; defaults to the origin request timeout
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
            acquire_timeout: None,
        }
    }
}

/// Two-tier cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for single-document entries
    #[serde(with = "humantime_serde")]
    pub document_ttl: Duration,

    /// TTL for list and search entries
    #[serde(with = "humantime_serde")]
    pub listing_ttl: Duration,

    /// Prefix prepended to every cache key
    pub key_prefix: String,

    /// Keys longer than this are shortened with a digest
    pub max_key_length: usize,

    /// In-process tier
    pub local: LocalCacheConfig,

    /// Redis tier
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            document_ttl: Duration::from_secs(300), // 5 minutes
            listing_ttl: Duration::from_secs(60),
            key_prefix: "docproxy:".to_string(),
            max_key_length: 250,
            local: LocalCacheConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// In-process cache tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,

    /// Interval of the background sweep reclaiming expired entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Redis tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Whether the distributed tier is used at all
    pub enabled: bool,

    /// Redis connection URL
    pub url: String,

    /// Timeout for establishing a connection
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Timeout for a single GET/SET/DEL
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// How long the tier stays dark after a failure before a reconnect is tried
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(30),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "docproxy=info".to_string(),
            json_logs: true,
        }
    }
}

impl GateConfig {
    /// Effective acquisition deadline given the origin settings
    pub fn effective_acquire_timeout(&self, origin: &OriginConfig) -> Duration {
        self.acquire_timeout.unwrap_or(origin.request_timeout)
    }
}
