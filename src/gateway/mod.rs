//! # Gateway Module
//!
//! Ties the cache, the concurrency gate and the origin client together behind
//! the document operations.
//!
//! ## Usage Example
//! ```rust,no_run
//! use docproxy::core::config::ProxyConfig;
//! use docproxy::gateway::{DocumentGateway, DocumentRequest};
//! use serde_json::json;
//!
//! # async fn demo() -> docproxy::ProxyResult<()> {
//! let config = ProxyConfig::load_from_file("docproxy.yaml").await?;
//! let gateway = DocumentGateway::from_config(&config).await?;
//!
//! let request = DocumentRequest::from_tool_call("get_document", json!({"doc_id": "123"}))?;
//! let reply = gateway.dispatch(request).await?;
//! println!("{}", reply.summary());
//! # Ok(())
//! # }
//! ```

pub mod documents;
pub mod pipeline;
pub mod request;

pub use documents::DocumentGateway;
pub use pipeline::RequestPipeline;
pub use request::{DocumentReply, DocumentRequest, TOOL_NAMES};
