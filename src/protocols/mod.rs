// HTTP client for the origin document API
pub mod http;

pub use http::{OriginClient, OriginRequest, OriginResponse};
