//! # HTTP Origin Client
//!
//! Thin `reqwest` wrapper that performs exactly one request per call against
//! the origin document API and classifies the outcome:
//!
//! - 2xx: [`OriginResponse`] carrying the raw body
//! - non-2xx: [`ProxyError::Origin`] with the status and body text
//! - deadline exceeded: [`ProxyError::Timeout`]
//! - anything else at the transport level: [`ProxyError::Network`]
//!
//! The client never retries.

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::core::config::OriginConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::observability::metrics;

/// A single request to the origin
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    /// Concrete path, e.g. `/documents/123`
    pub path: String,
    /// Route template used as the metric label, e.g. `/documents/{id}`
    pub endpoint: &'static str,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OriginRequest {
    pub fn new<P: Into<String>>(method: Method, path: P, endpoint: &'static str) -> Self {
        Self {
            method,
            path: path.into(),
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get<P: Into<String>>(path: P, endpoint: &'static str) -> Self {
        Self::new(Method::GET, path, endpoint)
    }

    pub fn post<P: Into<String>>(path: P, endpoint: &'static str) -> Self {
        Self::new(Method::POST, path, endpoint)
    }

    pub fn put<P: Into<String>>(path: P, endpoint: &'static str) -> Self {
        Self::new(Method::PUT, path, endpoint)
    }

    pub fn delete<P: Into<String>>(path: P, endpoint: &'static str) -> Self {
        Self::new(Method::DELETE, path, endpoint)
    }

    pub fn with_query<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ProxyResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// Successful origin response
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// HTTP client bound to one origin
#[derive(Debug, Clone)]
pub struct OriginClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl OriginClient {
    pub fn new(config: &OriginConfig) -> ProxyResult<Self> {
        let parsed = Url::parse(&config.base_url).map_err(|e| {
            ProxyError::config(format!("Invalid origin base URL '{}': {}", config.base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| ProxyError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Perform one request, bounded by the request timeout
    pub async fn call(&self, request: &OriginRequest) -> ProxyResult<OriginResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        // The outer timeout also bounds reading the body.
        let outcome = timeout(self.request_timeout, async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .await;
        let elapsed = started.elapsed();

        metrics::record_origin_request(request.method.as_str(), request.endpoint, elapsed);

        let result = match outcome {
            Err(_) => Err(self.timeout_error()),
            Ok(Err(e)) if e.is_timeout() => Err(self.timeout_error()),
            Ok(Err(e)) => Err(ProxyError::network(e.to_string())),
            Ok(Ok((status, body))) if status.is_success() => Ok(OriginResponse { status, body }),
            Ok(Ok((status, body))) => Err(ProxyError::Origin {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        };

        match &result {
            Ok(response) => debug!(
                method = %request.method,
                endpoint = request.endpoint,
                status = response.status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Origin request completed"
            ),
            Err(e) => warn!(
                method = %request.method,
                endpoint = request.endpoint,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Origin request failed"
            ),
        }

        result
    }

    fn timeout_error(&self) -> ProxyError {
        ProxyError::Timeout {
            timeout_ms: self.request_timeout.as_millis() as u64,
        }
    }
}
