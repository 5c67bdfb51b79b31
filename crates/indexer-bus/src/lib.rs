//! # Indexer Bus - Multi-Backend Event Bus
//!
//! The concurrency core of the indexer: typed chain events flow from the
//! fetch pipelines through a bounded publish queue into a single broadcast
//! task, which fans them out to per-subscriber bounded channels under type
//! and predicate filters.
//!
//! ## Delivery model
//!
//! ```text
//! ┌───────────┐  publish()   ┌─────────────┐  try_send   ┌────────────┐
//! │ producers │ ───────────▶ │  broadcast  │ ──────────▶ │ subscriber │
//! │ (fetchers)│   bounded    │    task     │  per-sub    │  channels  │
//! └───────────┘    queue     └─────────────┘  bounded    └────────────┘
//!                                  │
//!                                  ▼
//!                            ring buffer (replay)
//! ```
//!
//! - Publishing never blocks; overload surfaces as a `false` return.
//! - One task performs every subscriber send, so each subscriber sees the
//!   bus's publish order for the events it accepts.
//! - Slow subscribers lose events (counted per subscriber); they never
//!   stall the publisher or other subscribers.
//!
//! ## Backends
//!
//! [`LocalEventBus`] is the in-process core. [`RedisEventBus`] and
//! [`KafkaEventBus`] wrap it and fan accepted publishes out to a broker,
//! re-publishing inbound cross-node events locally with echo suppression.
//! [`create_event_bus`] selects a backend from configuration; an
//! unreachable broker degrades to local-only operation instead of failing.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod filter;
pub mod history;
pub mod kafka_bus;
pub mod metrics;
pub mod redis_bus;
pub mod remote;
pub mod shutdown;
pub mod subscription;

// Re-export main types
pub use bus::{
    BusState, BusStats, EventBus, HealthMode, HealthStatus, LocalBusOptions, LocalEventBus,
};
pub use codec::{decode_event, encode_event};
pub use config::{BackendKind, BusConfig, KafkaConfig, NodeIdentity, RedisConfig, TlsConfig};
pub use error::BusError;
pub use events::{ChainEvent, EventType};
pub use factory::{create_event_bus, create_event_bus_with_metrics};
pub use filter::EventFilter;
pub use kafka_bus::KafkaEventBus;
pub use metrics::{MetricsSink, NoopMetrics};
pub use redis_bus::RedisEventBus;
pub use remote::{RemoteDelivery, RemoteStats};
pub use shutdown::{ShutdownCoordinator, ShutdownHooks, StoppableProducer};
pub use subscription::{SubscribeOptions, SubscriberInfo, Subscription};

use std::time::Duration;

/// Default capacity of a subscription channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default capacity of the publish queue.
pub const DEFAULT_PUBLISH_BUFFER: usize = 1000;

/// Default capacity of the replay ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default deadline for a remote backend connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
