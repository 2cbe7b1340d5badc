//! # Document Proxy Library
//!
//! A caching, concurrency-bounded proxy in front of an HTTP document store.
//!
//! Reads are served from a two-tier cache (in-process LRU, then Redis) and
//! only reach the origin on a miss. Every origin call holds a permit of a
//! fixed-size gate, so a burst of callers queues instead of flooding the
//! origin. Mutations go straight to the origin and invalidate whatever they
//! made stale.

/// Error types, configuration and the document payloads
pub mod core;

/// Document operations, the read/mutate pipeline and tool dispatch
pub mod gateway;

/// HTTP client for the origin document API
pub mod protocols;

/// Logging setup and metric recording
pub mod observability;

/// Two-tier cache: local LRU, Redis, and the coordinator over both
pub mod caching;

/// Concurrency gate bounding origin calls
pub mod traffic;

pub use crate::core::error::{ProxyError, ProxyResult};
pub use crate::core::config::ProxyConfig;
pub use crate::core::types::{Document, DocumentDraft, DocumentPage, DocumentPatch, Pagination, SearchField};
pub use crate::gateway::{DocumentGateway, DocumentReply, DocumentRequest};
pub use crate::observability::init_tracing;
