//! # Metrics Hook
//!
//! The bus does not register Prometheus collectors itself; it reports
//! through this sink trait and the composition root decides where the
//! numbers go. `indexer-telemetry` ships a Prometheus-backed sink; tests
//! and minimal deployments use the no-op.

use crate::events::EventType;

/// Receiver for broadcast-loop measurements.
///
/// Implementations must be cheap and non-blocking; they run inline in the
/// broadcast task.
pub trait MetricsSink: Send + Sync {
    /// An event was accepted by the broadcast loop.
    fn event_published(&self, event_type: EventType);

    /// An event was handed to one subscriber's channel.
    fn event_delivered(&self, event_type: EventType);

    /// An event was dropped on one subscriber's full channel.
    fn event_dropped(&self, event_type: EventType);

    /// An event was rejected by one subscriber's filter.
    fn event_filtered(&self, event_type: EventType);

    /// Seconds between event creation and delivery to a channel.
    fn delivery_latency(&self, event_type: EventType, seconds: f64);

    /// Seconds spent evaluating one filter.
    fn filter_latency(&self, seconds: f64);

    /// Seconds spent fanning one event out to all subscribers.
    fn broadcast_duration(&self, seconds: f64);

    /// Current number of subscribers accepting the given type.
    fn subscriber_count(&self, event_type: EventType, count: usize);

    /// Current publish-queue occupancy out of its capacity.
    fn publish_queue_occupancy(&self, len: usize, capacity: usize);
}

/// Sink that discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn event_published(&self, _event_type: EventType) {}
    fn event_delivered(&self, _event_type: EventType) {}
    fn event_dropped(&self, _event_type: EventType) {}
    fn event_filtered(&self, _event_type: EventType) {}
    fn delivery_latency(&self, _event_type: EventType, _seconds: f64) {}
    fn filter_latency(&self, _seconds: f64) {}
    fn broadcast_duration(&self, _seconds: f64) {}
    fn subscriber_count(&self, _event_type: EventType, _count: usize) {}
    fn publish_queue_occupancy(&self, _len: usize, _capacity: usize) {}
}
