//! # Bus Factory
//!
//! Turns a validated [`BusConfig`] into a running backend. Remote connect
//! failures are recoverable: the adapter is returned anyway and operates
//! as a local-only bus (degraded mode).

use crate::bus::{EventBus, LocalBusOptions, LocalEventBus};
use crate::config::{BackendKind, BusConfig};
use crate::error::BusError;
use crate::kafka_bus::KafkaEventBus;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::redis_bus::RedisEventBus;
use crate::DEFAULT_CONNECT_TIMEOUT;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the backend selected by the configuration, with no metrics sink.
pub async fn create_event_bus(config: &BusConfig) -> Result<Arc<dyn EventBus>, BusError> {
    create_event_bus_with_metrics(config, Arc::new(NoopMetrics)).await
}

/// Build the backend selected by the configuration.
///
/// Selection:
/// - `local` (or empty) builds the in-process bus.
/// - `redis` / `kafka` build the adapter when enabled, else warn and fall
///   back to local. A failed connect still returns the adapter, degraded.
/// - `hybrid` prefers Redis when enabled, else Kafka, else local.
pub async fn create_event_bus_with_metrics(
    config: &BusConfig,
    metrics: Arc<dyn MetricsSink>,
) -> Result<Arc<dyn EventBus>, BusError> {
    config.validate()?;
    let kind = config.backend_kind()?;

    match kind {
        BackendKind::Local => {
            info!("event bus backend: local");
            Ok(Arc::new(new_local(config, metrics)))
        }
        BackendKind::Redis => {
            if !config.redis.enabled {
                warn!("redis backend selected but disabled; falling back to local bus");
                return Ok(Arc::new(new_local(config, metrics)));
            }
            Ok(build_redis(config, metrics).await)
        }
        BackendKind::Kafka => {
            if !config.kafka.enabled {
                warn!("kafka backend selected but disabled; falling back to local bus");
                return Ok(Arc::new(new_local(config, metrics)));
            }
            Ok(build_kafka(config, metrics).await)
        }
        BackendKind::Hybrid => {
            if config.redis.enabled {
                info!("hybrid backend: using redis");
                Ok(build_redis(config, metrics).await)
            } else if config.kafka.enabled {
                info!("hybrid backend: using kafka");
                Ok(build_kafka(config, metrics).await)
            } else {
                warn!("hybrid backend with no remote enabled; falling back to local bus");
                Ok(Arc::new(new_local(config, metrics)))
            }
        }
    }
}

fn new_local(config: &BusConfig, metrics: Arc<dyn MetricsSink>) -> LocalEventBus {
    LocalEventBus::with_options(LocalBusOptions {
        publish_buffer_size: config.effective_publish_buffer(),
        history_size: config.effective_history_size(),
        metrics,
    })
}

async fn build_redis(config: &BusConfig, metrics: Arc<dyn MetricsSink>) -> Arc<dyn EventBus> {
    let node_id = config.node_id();
    let adapter = RedisEventBus::new(new_local(config, metrics), config.redis.clone(), node_id);
    if let Err(e) = adapter.connect(DEFAULT_CONNECT_TIMEOUT).await {
        warn!(error = %e, "redis connect failed; continuing in degraded (local-only) mode");
    }
    Arc::new(adapter)
}

async fn build_kafka(config: &BusConfig, metrics: Arc<dyn MetricsSink>) -> Arc<dyn EventBus> {
    let node_id = config.node_id();
    let adapter = KafkaEventBus::new(new_local(config, metrics), config.kafka.clone(), node_id);
    if let Err(e) = adapter.connect(DEFAULT_CONNECT_TIMEOUT).await {
        warn!(error = %e, "kafka connect failed; continuing in degraded (local-only) mode");
    }
    Arc::new(adapter)
}
