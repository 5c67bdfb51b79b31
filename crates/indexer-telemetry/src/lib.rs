//! # Indexer Telemetry
//!
//! Observability for the indexer: Prometheus metrics and structured
//! logging via `tracing`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use indexer_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::from_env();
//! let _handle = init_telemetry(&config).expect("telemetry init");
//! ```

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, register_metrics, HistogramTimer, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Logging subscriber installation failed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Prometheus registration or encoding failed.
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Configuration is malformed.
    #[error("invalid telemetry configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics in one call.
///
/// Returns a handle that keeps the metrics registry alive; hold it for
/// the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<MetricsHandle, TelemetryError> {
    let handle = register_metrics()?;
    init_logging(config)?;
    Ok(handle)
}
