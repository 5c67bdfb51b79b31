//! # Bus Errors
//!
//! Error types for every bus surface: publish, subscription management,
//! remote transport, configuration, and shutdown.

use thiserror::Error;

/// Errors returned by the event bus and its adapters.
#[derive(Debug, Error)]
pub enum BusError {
    /// The event could not be enqueued (bus stopped or queue full).
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// A remote operation was attempted without an active connection.
    #[error("not connected to remote backend")]
    NotConnected,

    /// `connect` was called on an adapter that is already connected.
    #[error("already connected to remote backend")]
    AlreadyConnected,

    /// The remote backend could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An event could not be serialized for transport.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// An inbound payload could not be deserialized.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The wire envelope carried an unknown event type tag.
    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    /// No live subscription exists with the given ID.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// A live subscription already uses the given ID.
    #[error("subscription already exists: {0}")]
    DuplicateSubscription(String),

    /// The subscription filter failed validation.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The bus configuration is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation exceeded its deadline.
    #[error("operation timed out")]
    OperationTimedOut,

    /// The caller's cancellation handle fired before the operation ran.
    #[error("operation cancelled")]
    Cancelled,

    /// The bus is shutting down and no longer accepts work.
    #[error("bus is shutting down")]
    ShuttingDown,

    /// A subscription channel was closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Convenience alias for bus results.
pub type Result<T> = std::result::Result<T, BusError>;
