//! # Shared Remote-Adapter Types
//!
//! Types common to the Redis and Kafka fan-out adapters.

/// What an adapter's receive path did with one inbound broker message.
#[derive(Debug, PartialEq, Eq)]
pub enum RemoteDelivery {
    /// Our own message looped back by the broker; dropped before the
    /// inner envelope was decoded.
    Echo,
    /// Decoded and re-published on the local bus.
    Delivered,
    /// Decoded but the local publish queue refused it.
    LocalPublishFailed,
}

/// Counters for the remote half of an adapter.
#[derive(Debug, Clone, Copy)]
pub struct RemoteStats {
    /// Whether the broker connection is up.
    pub connected: bool,
    /// Outbound publishes that failed at the broker.
    pub publish_errors: u64,
    /// Inbound messages dropped by echo suppression.
    pub echoes_skipped: u64,
    /// Inbound messages re-published locally.
    pub remote_received: u64,
}
