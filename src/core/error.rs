//! # Error Handling Module
//!
//! This module defines every error the proxy can hand back to a caller of the
//! document gateway. It uses the `thiserror` crate so each variant carries its
//! own `Display` text and the whole enum implements `std::error::Error`.
//!
//! ## Taxonomy
//! - `Timeout`: the origin call exceeded its deadline
//! - `Origin`: the origin answered with a non-success status (status + body kept)
//! - `Network`: the origin could not be reached at the transport level
//! - `Busy`: the concurrency gate stayed exhausted past the request deadline
//!
//! Distributed-cache failures are deliberately absent here. They are absorbed by
//! the cache coordinator and only ever show up in logs and metrics, see
//! [`crate::caching::CacheError`].
//!
//! The remaining variants cover the edges of the core: configuration loading,
//! payload decoding and validation of loosely-typed tool arguments.

use thiserror::Error;

/// Main result type used throughout the proxy
///
/// Instead of writing `Result<T, ProxyError>` everywhere we use `ProxyResult<T>`.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors surfaced by the document gateway and its building blocks
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The origin call did not complete within its deadline
    #[error("Origin request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The origin answered with a non-success status code
    #[error("Origin returned HTTP {status}: {body}")]
    Origin { status: u16, body: String },

    /// Transport-level failure reaching the origin (DNS, connect, reset, ...)
    #[error("Network error reaching origin: {message}")]
    Network { message: String },

    /// No concurrency permit became available before the deadline
    #[error("Proxy busy: no origin slot available after {waited_ms}ms")]
    Busy { waited_ms: u64 },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A request did not satisfy the operation's argument contract
    #[error("Invalid request: {field} - {reason}")]
    InvalidRequest { field: String, reason: String },

    /// The origin payload (or a cached copy of it) could not be decoded
    #[error("Failed to decode payload: {message}")]
    Decode { message: String },
}

impl ProxyError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid-request error for a specific argument
    pub fn invalid_request<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error with a custom message
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a network error with a custom message
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// HTTP status returned by the origin, if this error came from one
    pub fn origin_status(&self) -> Option<u16> {
        match self {
            Self::Origin { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the origin reported that the addressed document does not exist
    pub fn is_not_found(&self) -> bool {
        self.origin_status() == Some(404)
    }

    /// Check if a caller could reasonably retry this request
    ///
    /// This is advisory only. The proxy itself never retries: origin calls are
    /// treated as at-most-once.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Network { .. } => true,
            Self::Busy { .. } => true,
            Self::Origin { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get a string representation of the error type for logs and metric labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Origin { .. } => "origin_error",
            Self::Network { .. } => "network_error",
            Self::Busy { .. } => "busy",
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Decode { .. } => "decode_error",
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("YAML error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types_are_distinct() {
        let errors = [
            ProxyError::Timeout { timeout_ms: 10 },
            ProxyError::Origin { status: 500, body: "boom".to_string() },
            ProxyError::network("connection refused"),
            ProxyError::Busy { waited_ms: 10 },
        ];

        let mut labels: Vec<&str> = errors.iter().map(|e| e.error_type()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ProxyError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(ProxyError::network("reset").is_retryable());
        assert!(ProxyError::Origin { status: 503, body: String::new() }.is_retryable());
        assert!(!ProxyError::Origin { status: 404, body: String::new() }.is_retryable());
        assert!(!ProxyError::invalid_request("term", "empty").is_retryable());
    }

    #[test]
    fn test_origin_status_helpers() {
        let err = ProxyError::Origin { status: 404, body: "missing".to_string() };
        assert_eq!(err.origin_status(), Some(404));
        assert!(err.is_not_found());
        assert_eq!(ProxyError::Busy { waited_ms: 1 }.origin_status(), None);
    }

    #[test]
    fn test_display_includes_origin_body() {
        let err = ProxyError::Origin { status: 400, body: "bad term".to_string() };
        assert_eq!(err.to_string(), "Origin returned HTTP 400: bad term");
    }
}
