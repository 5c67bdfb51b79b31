//! Structured logging setup.
//!
//! One call installs the global `tracing` subscriber: an `EnvFilter`
//! honoring the configured level (overridable via `RUST_LOG`) and either
//! human-readable or JSON output.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global logging subscriber.
///
/// Safe to call once per process; a second call reports an error from the
/// global-default installation rather than panicking.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "logging initialized"
    );
    Ok(())
}
