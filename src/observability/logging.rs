//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! configured filter when both are present.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::ObservabilityConfig;
use crate::core::error::{ProxyError, ProxyResult};

/// Build the filter from `RUST_LOG`, falling back to the configured directive
pub fn build_filter(config: &ObservabilityConfig) -> ProxyResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_filter).map_err(|e| {
            ProxyError::config(format!("Invalid log filter '{}': {}", config.log_filter, e))
        }),
    }
}

/// Initialize the tracing subscriber
///
/// Calling this more than once is harmless: later calls log a warning and
/// keep the subscriber that is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> ProxyResult<()> {
    let env_filter = build_filter(config)?;

    let installed = if config.json_logs {
        Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        json = config.json_logs,
        "Structured logging initialized"
    );
    Ok(())
}
