// Structured logging
pub mod logging;

// Metric names and recording helpers
pub mod metrics;

pub use logging::init_tracing;
