//! Prometheus metrics for the indexer event bus.
//!
//! All metrics follow the naming convention: `idx_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    /// Events accepted by the broadcast loop, by type
    pub static ref BUS_EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("idx_bus_events_published_total", "Events accepted by the broadcast loop"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Events delivered to subscriber channels, by type
    pub static ref BUS_EVENTS_DELIVERED: CounterVec = CounterVec::new(
        Opts::new("idx_bus_events_delivered_total", "Events delivered to subscriber channels"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Events dropped on full subscriber channels, by type
    pub static ref BUS_EVENTS_DROPPED: CounterVec = CounterVec::new(
        Opts::new("idx_bus_events_dropped_total", "Events dropped on full subscriber channels"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Events rejected by subscriber filters, by type
    pub static ref BUS_EVENTS_FILTERED: CounterVec = CounterVec::new(
        Opts::new("idx_bus_events_filtered_total", "Events rejected by subscriber filters"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Time from event creation to channel delivery
    pub static ref BUS_DELIVERY_LATENCY: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "idx_bus_delivery_latency_seconds",
            "Time from event creation to channel delivery"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).unwrap()),
        &["event_type"]
    ).expect("metric creation failed");

    /// Time spent evaluating one subscription filter
    pub static ref BUS_FILTER_LATENCY: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "idx_bus_filter_match_latency_seconds",
            "Time spent evaluating one subscription filter"
        ).buckets(exponential_buckets(0.000001, 2.0, 12).unwrap())
    ).expect("metric creation failed");

    /// Time spent fanning one event out to all subscribers
    pub static ref BUS_BROADCAST_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "idx_bus_broadcast_duration_seconds",
            "Time spent fanning one event out to all subscribers"
        ).buckets(exponential_buckets(0.00001, 2.0, 14).unwrap())
    ).expect("metric creation failed");

    /// Subscribers accepting each event type
    pub static ref BUS_SUBSCRIBERS: GaugeVec = GaugeVec::new(
        Opts::new("idx_bus_subscribers", "Subscribers accepting each event type"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Current publish queue occupancy
    pub static ref BUS_PUBLISH_QUEUE_LEN: Gauge = Gauge::new(
        "idx_bus_publish_queue_len",
        "Current publish queue occupancy"
    ).expect("metric creation failed");

    /// Publish queue capacity
    pub static ref BUS_PUBLISH_QUEUE_CAPACITY: Gauge = Gauge::new(
        "idx_bus_publish_queue_capacity",
        "Publish queue capacity"
    ).expect("metric creation failed");

    // =========================================================================
    // PIPELINE METRICS
    // =========================================================================

    /// Parsed events processed by the stage pipeline
    pub static ref PIPELINE_EVENTS: CounterVec = CounterVec::new(
        Opts::new("idx_pipeline_events_total", "Parsed events processed, by outcome"),
        &["outcome"]  // outcome: ok/error
    ).expect("metric creation failed");

    /// Stage processing duration
    pub static ref PIPELINE_STAGE_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "idx_pipeline_stage_duration_seconds",
            "Time spent in each pipeline stage"
        ).buckets(exponential_buckets(0.00001, 2.0, 14).unwrap()),
        &["stage"]
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(BUS_EVENTS_PUBLISHED.clone()),
        Box::new(BUS_EVENTS_DELIVERED.clone()),
        Box::new(BUS_EVENTS_DROPPED.clone()),
        Box::new(BUS_EVENTS_FILTERED.clone()),
        Box::new(BUS_DELIVERY_LATENCY.clone()),
        Box::new(BUS_FILTER_LATENCY.clone()),
        Box::new(BUS_BROADCAST_DURATION.clone()),
        Box::new(BUS_SUBSCRIBERS.clone()),
        Box::new(BUS_PUBLISH_QUEUE_LEN.clone()),
        Box::new(BUS_PUBLISH_QUEUE_CAPACITY.clone()),
        // Pipeline
        Box::new(PIPELINE_EVENTS.clone()),
        Box::new(PIPELINE_STAGE_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    #[must_use]
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
