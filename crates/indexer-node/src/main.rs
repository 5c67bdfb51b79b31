//! # Chain-Indexer Node
//!
//! The indexer binary: loads configuration, wires the event bus backend,
//! exposes metrics, and tears everything down in priority order on
//! shutdown.
//!
//! Exit codes: `0` normal, `1` fatal startup error, `2` invalid
//! configuration.

mod server;
mod sink;

use anyhow::Result;
use indexer_bus::shutdown::{PRIORITY_API, PRIORITY_CLEANUP, PRIORITY_EVENT_BUS};
use indexer_bus::{create_event_bus_with_metrics, BusConfig, BusError, EventBus, ShutdownHooks};
use indexer_telemetry::TelemetryConfig;
use sink::PrometheusBusMetrics;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

fn config_path() -> Option<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("INDEXER_CONFIG").ok())
        .map(PathBuf::from)
}

fn load_config() -> Result<BusConfig, BusError> {
    match config_path() {
        Some(path) => BusConfig::load(&path),
        None => {
            let mut config = BusConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let telemetry_config = TelemetryConfig::from_env();
    let _telemetry = match indexer_telemetry::init_telemetry(&telemetry_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("telemetry init failed: {e}");
            return ExitCode::from(1);
        }
    };

    let bus_config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    match run(bus_config, telemetry_config.metrics_port).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: BusConfig, metrics_port: u16) -> Result<()> {
    info!(backend = %config.backend, "starting chain-indexer node");

    let bus = create_event_bus_with_metrics(&config, Arc::new(PrometheusBusMetrics)).await?;
    bus.start().await?;
    info!(health = ?bus.health_status(), "event bus started");

    let metrics_task = server::start_metrics_server(metrics_port, Arc::clone(&bus)).await?;

    let hooks = ShutdownHooks::new();
    let hook_bus = Arc::clone(&bus);
    hooks.register("event-bus", PRIORITY_EVENT_BUS, move || {
        let bus = Arc::clone(&hook_bus);
        async move { bus.stop().await }
    });
    hooks.register("metrics-server", PRIORITY_API, move || {
        let handle = metrics_task.abort_handle();
        async move {
            handle.abort();
            Ok(())
        }
    });
    hooks.register("cleanup", PRIORITY_CLEANUP, || async {
        info!("shutdown complete");
        Ok(())
    });

    info!("node is running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Err(e) = hooks.run(SHUTDOWN_DEADLINE).await {
        error!(error = %e, "shutdown finished with errors");
    }
    Ok(())
}
