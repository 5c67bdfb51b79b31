//! Prometheus-backed metrics sink for the event bus.
//!
//! The bus reports through `indexer_bus::MetricsSink`; this adapter maps
//! those callbacks onto the `idx_bus_*` collectors owned by
//! `indexer-telemetry`.

use indexer_bus::{EventType, MetricsSink};
use indexer_telemetry::metrics;

/// Routes bus measurements into the global Prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusBusMetrics;

impl MetricsSink for PrometheusBusMetrics {
    fn event_published(&self, event_type: EventType) {
        metrics::BUS_EVENTS_PUBLISHED
            .with_label_values(&[event_type.as_str()])
            .inc();
    }

    fn event_delivered(&self, event_type: EventType) {
        metrics::BUS_EVENTS_DELIVERED
            .with_label_values(&[event_type.as_str()])
            .inc();
    }

    fn event_dropped(&self, event_type: EventType) {
        metrics::BUS_EVENTS_DROPPED
            .with_label_values(&[event_type.as_str()])
            .inc();
    }

    fn event_filtered(&self, event_type: EventType) {
        metrics::BUS_EVENTS_FILTERED
            .with_label_values(&[event_type.as_str()])
            .inc();
    }

    fn delivery_latency(&self, event_type: EventType, seconds: f64) {
        metrics::BUS_DELIVERY_LATENCY
            .with_label_values(&[event_type.as_str()])
            .observe(seconds);
    }

    fn filter_latency(&self, seconds: f64) {
        metrics::BUS_FILTER_LATENCY.observe(seconds);
    }

    fn broadcast_duration(&self, seconds: f64) {
        metrics::BUS_BROADCAST_DURATION.observe(seconds);
    }

    fn subscriber_count(&self, event_type: EventType, count: usize) {
        metrics::BUS_SUBSCRIBERS
            .with_label_values(&[event_type.as_str()])
            .set(count as f64);
    }

    fn publish_queue_occupancy(&self, len: usize, capacity: usize) {
        metrics::BUS_PUBLISH_QUEUE_LEN.set(len as f64);
        metrics::BUS_PUBLISH_QUEUE_CAPACITY.set(capacity as f64);
    }
}
