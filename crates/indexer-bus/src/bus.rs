//! # Local Event Bus
//!
//! The in-process broker: a bounded publish queue drained by a single
//! broadcast task that records history and fans out to per-subscriber
//! bounded channels.
//!
//! Delivery rules:
//! - `publish` never blocks; a full queue or a stopped bus yields `false`.
//! - One task performs every subscriber send, so each subscriber observes
//!   the bus's publish order for the events it accepts.
//! - A slow subscriber loses events (counted per subscriber); it never
//!   stalls the publisher or its peers.

use crate::error::BusError;
use crate::events::{ChainEvent, EventType};
use crate::filter::EventFilter;
use crate::history::EventHistory;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::subscription::{
    SubscribeOptions, SubscriberInfo, SubscriberStats, Subscription, SubscriptionEntry,
    SubscriptionRegistry,
};
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_HISTORY_CAPACITY, DEFAULT_PUBLISH_BUFFER};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bus lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusState {
    /// Constructed, broadcast task not yet running.
    Created,
    /// Broadcast task running.
    Running,
    /// Stop requested, channels closing.
    Stopping,
    /// Fully stopped.
    Stopped,
}

impl BusState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Counter snapshot for the whole bus.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BusStats {
    /// Current lifecycle state.
    pub state: BusState,
    /// Events drained from the publish queue.
    pub total_events: u64,
    /// Successful channel sends, summed over subscribers.
    pub total_deliveries: u64,
    /// Channel-full drops, summed over subscribers.
    pub dropped_events: u64,
    /// Filter rejections, summed over subscribers.
    pub filtered_events: u64,
    /// Live subscriptions.
    pub subscribers: usize,
}

/// Backend operating mode for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMode {
    /// In-process only; no remote backend configured.
    Local,
    /// Remote backend connected.
    Connected,
    /// Remote backend configured but unreachable; operating locally.
    Degraded,
}

/// Health report for the uniform bus interface.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Backend name (`local`, `redis`, `kafka`).
    pub backend: String,
    /// Operating mode.
    pub mode: HealthMode,
    /// Explanatory detail, set in degraded mode.
    pub detail: Option<String>,
}

/// The uniform bus interface. Every backend (local, Redis pub/sub, Kafka
/// partitioned log) exposes this; remote backends degrade to local-only
/// operation when unreachable.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Enqueue an event for broadcast. Never blocks.
    ///
    /// Returns `true` iff the event was enqueued; `false` when the bus is
    /// stopped or the publish queue is full.
    fn publish(&self, event: ChainEvent) -> bool;

    /// Like [`publish`](Self::publish), but observes the caller's
    /// cancellation handle first.
    fn publish_with_context(
        &self,
        ctx: &CancellationToken,
        event: ChainEvent,
    ) -> Result<(), BusError>;

    /// Register a subscription. The subscription is observable by the next
    /// publish before this returns; with `replay_last` set, ring-buffer
    /// events are delivered (oldest first) before any live event.
    fn subscribe(
        &self,
        id: &str,
        types: &[EventType],
        filter: Option<EventFilter>,
        opts: SubscribeOptions,
    ) -> Result<Subscription, BusError>;

    /// Remove a subscription and close its channel.
    fn unsubscribe(&self, id: &str) -> Result<(), BusError>;

    /// Number of live subscriptions.
    fn subscriber_count(&self) -> usize;

    /// Snapshot of one subscription.
    fn subscriber_info(&self, id: &str) -> Option<SubscriberInfo>;

    /// Snapshot of every subscription, ordered by ID.
    fn all_subscriber_info(&self) -> Vec<SubscriberInfo>;

    /// Counter snapshot.
    fn stats(&self) -> BusStats;

    /// Start the broadcast task. Idempotent while running.
    async fn start(&self) -> Result<(), BusError>;

    /// Stop the bus: cancel the broadcast task, close every subscription
    /// channel, drop outstanding history. Idempotent.
    async fn stop(&self) -> Result<(), BusError>;

    /// Tear down any remote connection. No-op for the local bus.
    async fn disconnect(&self) -> Result<(), BusError>;

    /// Whether the bus is accepting and delivering events.
    fn healthy(&self) -> bool;

    /// Backend health report.
    fn health_status(&self) -> HealthStatus;
}

/// Construction options for [`LocalEventBus`].
pub struct LocalBusOptions {
    /// Publish queue capacity.
    pub publish_buffer_size: usize,
    /// Replay ring capacity.
    pub history_size: usize,
    /// Metrics sink. Defaults to the no-op sink.
    pub metrics: Arc<dyn MetricsSink>,
}

impl Default for LocalBusOptions {
    fn default() -> Self {
        Self {
            publish_buffer_size: DEFAULT_PUBLISH_BUFFER,
            history_size: DEFAULT_HISTORY_CAPACITY,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

struct BusCore {
    registry: Arc<SubscriptionRegistry>,
    history: Mutex<EventHistory>,
    state: AtomicU8,
    total_events: AtomicU64,
    total_deliveries: AtomicU64,
    dropped_events: AtomicU64,
    filtered_events: AtomicU64,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    history_capacity: usize,
}

impl BusCore {
    fn state(&self) -> BusState {
        BusState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: BusState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Fan one event out to every matching subscriber. Runs on the
    /// broadcast task only.
    fn broadcast(&self, event: ChainEvent) {
        let started = Instant::now();
        let event_type = event.event_type();

        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push(event.clone());
        }
        self.metrics.event_published(event_type);

        let mut type_counts = [0usize; EventType::ALL.len()];
        {
            let subs = self.registry.read();
            for entry in subs.values() {
                for (i, ty) in EventType::ALL.iter().enumerate() {
                    if entry.types.contains(ty) {
                        type_counts[i] += 1;
                    }
                }
                if !entry.types.contains(&event_type) {
                    continue;
                }
                if let Some(filter) = &entry.filter {
                    let filter_started = Instant::now();
                    let matched = filter.matches(&event);
                    self.metrics
                        .filter_latency(filter_started.elapsed().as_secs_f64());
                    if !matched {
                        self.filtered_events.fetch_add(1, Ordering::Relaxed);
                        self.metrics.event_filtered(event_type);
                        continue;
                    }
                }
                self.deliver(entry, event.clone(), event_type);
            }
        }

        for (i, ty) in EventType::ALL.iter().enumerate() {
            self.metrics.subscriber_count(*ty, type_counts[i]);
        }
        self.metrics
            .broadcast_duration(started.elapsed().as_secs_f64());
    }

    /// Non-blocking send to one subscriber, with drop accounting.
    fn deliver(&self, entry: &SubscriptionEntry, event: ChainEvent, event_type: EventType) {
        let created = event.timestamp();
        match entry.sender.try_send(event) {
            Ok(()) => {
                self.total_deliveries.fetch_add(1, Ordering::Relaxed);
                entry.stats.record_delivery();
                self.metrics.event_delivered(event_type);
                let latency = (Utc::now() - created)
                    .to_std()
                    .unwrap_or_default()
                    .as_secs_f64();
                self.metrics.delivery_latency(event_type, latency);
            }
            Err(_) => {
                // Channel full, or the subscriber went away mid-broadcast.
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                entry.stats.record_drop();
                self.metrics.event_dropped(event_type);
            }
        }
    }
}

/// The in-process bus implementation.
pub struct LocalEventBus {
    core: Arc<BusCore>,
    publish_tx: mpsc::Sender<ChainEvent>,
    publish_rx: Mutex<Option<mpsc::Receiver<ChainEvent>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    publish_capacity: usize,
}

impl LocalEventBus {
    /// Create a bus with default capacities and no metrics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(LocalBusOptions::default())
    }

    /// Create a bus with explicit queue and history capacities.
    #[must_use]
    pub fn with_capacity(publish_buffer_size: usize, history_size: usize) -> Self {
        Self::with_options(LocalBusOptions {
            publish_buffer_size,
            history_size,
            ..LocalBusOptions::default()
        })
    }

    /// Create a bus from full options.
    #[must_use]
    pub fn with_options(options: LocalBusOptions) -> Self {
        let publish_capacity = if options.publish_buffer_size == 0 {
            DEFAULT_PUBLISH_BUFFER
        } else {
            options.publish_buffer_size
        };
        let (publish_tx, publish_rx) = mpsc::channel(publish_capacity);
        Self {
            core: Arc::new(BusCore {
                registry: Arc::new(SubscriptionRegistry::new()),
                history: Mutex::new(EventHistory::new(options.history_size)),
                state: AtomicU8::new(BusState::Created as u8),
                total_events: AtomicU64::new(0),
                total_deliveries: AtomicU64::new(0),
                dropped_events: AtomicU64::new(0),
                filtered_events: AtomicU64::new(0),
                metrics: options.metrics,
                cancel: CancellationToken::new(),
                history_capacity: options.history_size,
            }),
            publish_tx,
            publish_rx: Mutex::new(Some(publish_rx)),
            task: tokio::sync::Mutex::new(None),
            publish_capacity,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BusState {
        self.core.state()
    }

    /// The cancellation token long-running adapter tasks derive from.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.core.cancel
    }

    /// The replay ring capacity.
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.core.history_capacity
    }

    /// The most recent `n` ring-buffer events, oldest first. Diagnostic
    /// surface; replay for subscribers goes through `subscribe`.
    #[must_use]
    pub fn recent_history(&self, n: usize) -> Vec<ChainEvent> {
        let snapshot = {
            let history = self
                .core
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            history.snapshot()
        };
        let skip = snapshot.len().saturating_sub(n);
        snapshot.into_iter().skip(skip).map(|h| h.event).collect()
    }

    fn record_queue_occupancy(&self) {
        let remaining = self.publish_tx.capacity();
        let len = self.publish_capacity.saturating_sub(remaining);
        self.core
            .metrics
            .publish_queue_occupancy(len, self.publish_capacity);
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    fn publish(&self, event: ChainEvent) -> bool {
        match self.core.state() {
            BusState::Stopping | BusState::Stopped => return false,
            BusState::Created | BusState::Running => {}
        }
        let accepted = self.publish_tx.try_send(event).is_ok();
        self.record_queue_occupancy();
        accepted
    }

    fn publish_with_context(
        &self,
        ctx: &CancellationToken,
        event: ChainEvent,
    ) -> Result<(), BusError> {
        if ctx.is_cancelled() {
            return Err(BusError::Cancelled);
        }
        if self.publish(event) {
            Ok(())
        } else {
            Err(BusError::PublishFailed(
                "bus stopped or publish queue full".to_string(),
            ))
        }
    }

    fn subscribe(
        &self,
        id: &str,
        types: &[EventType],
        filter: Option<EventFilter>,
        opts: SubscribeOptions,
    ) -> Result<Subscription, BusError> {
        match self.core.state() {
            BusState::Stopping | BusState::Stopped => return Err(BusError::ShuttingDown),
            BusState::Created | BusState::Running => {}
        }

        // Validate before any side effect.
        if let Some(filter) = &filter {
            filter.validate()?;
        }

        let id = if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };
        let channel_size = if opts.channel_size == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            opts.channel_size
        };
        let replay_last = opts.replay_last.min(self.core.history_capacity);
        let type_set: HashSet<EventType> = types.iter().copied().collect();

        // Registration and replay happen under the registry write lock so
        // the subscription is observable by the next broadcast, and replay
        // interleaves with live delivery at a single boundary.
        let registry = Arc::clone(&self.core.registry);
        let mut subs = registry.write();
        // Re-check under the lock: no registration may land after a
        // concurrent stop() cleared the registry.
        if matches!(self.core.state(), BusState::Stopping | BusState::Stopped) {
            return Err(BusError::ShuttingDown);
        }
        if subs.contains_key(&id) {
            return Err(BusError::DuplicateSubscription(id));
        }

        let (sender, receiver) = mpsc::channel(channel_size);
        let stats = Arc::new(SubscriberStats::new());
        let entry = SubscriptionEntry {
            id: id.clone(),
            types: type_set.clone(),
            filter: filter.clone(),
            sender,
            channel_size,
            stats: Arc::clone(&stats),
        };

        if replay_last > 0 {
            let snapshot = {
                let history = self
                    .core
                    .history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                history.snapshot()
            };
            let matching: Vec<ChainEvent> = snapshot
                .into_iter()
                .map(|h| h.event)
                .filter(|event| {
                    type_set.contains(&event.event_type())
                        && filter.as_ref().map_or(true, |f| f.matches(event))
                })
                .collect();
            let skip = matching.len().saturating_sub(replay_last);
            for event in matching.into_iter().skip(skip) {
                let event_type = event.event_type();
                match entry.sender.try_send(event) {
                    Ok(()) => {
                        self.core.total_deliveries.fetch_add(1, Ordering::Relaxed);
                        entry.stats.record_delivery();
                        self.core.metrics.event_delivered(event_type);
                    }
                    Err(_) => {
                        self.core.dropped_events.fetch_add(1, Ordering::Relaxed);
                        entry.stats.record_drop();
                        self.core.metrics.event_dropped(event_type);
                    }
                }
            }
        }

        subs.insert(id.clone(), entry);
        drop(subs);
        debug!(subscription = %id, types = types.len(), replay = replay_last, "subscribed");

        Ok(Subscription::new(
            id,
            type_set,
            receiver,
            stats,
            Arc::downgrade(&registry),
        ))
    }

    fn unsubscribe(&self, id: &str) -> Result<(), BusError> {
        self.core
            .registry
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BusError::SubscriptionNotFound(id.to_string()))
    }

    fn subscriber_count(&self) -> usize {
        self.core.registry.count()
    }

    fn subscriber_info(&self, id: &str) -> Option<SubscriberInfo> {
        self.core.registry.info(id)
    }

    fn all_subscriber_info(&self) -> Vec<SubscriberInfo> {
        self.core.registry.all_info()
    }

    fn stats(&self) -> BusStats {
        BusStats {
            state: self.core.state(),
            total_events: self.core.total_events.load(Ordering::Relaxed),
            total_deliveries: self.core.total_deliveries.load(Ordering::Relaxed),
            dropped_events: self.core.dropped_events.load(Ordering::Relaxed),
            filtered_events: self.core.filtered_events.load(Ordering::Relaxed),
            subscribers: self.core.registry.count(),
        }
    }

    async fn start(&self) -> Result<(), BusError> {
        match self.core.state() {
            BusState::Running => return Ok(()),
            BusState::Stopping | BusState::Stopped => return Err(BusError::ShuttingDown),
            BusState::Created => {}
        }

        let rx = {
            let mut slot = self
                .publish_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        let Some(mut rx) = rx else {
            // Another start call won the race for the receiver.
            return Ok(());
        };

        let core = Arc::clone(&self.core);
        core.set_state(BusState::Running);
        info!("event bus broadcast task starting");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(event) => core.broadcast(event),
                        None => break,
                    },
                }
            }
            debug!("event bus broadcast task exited");
        });

        let mut task = self.task.lock().await;
        *task = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BusError> {
        match self.core.state() {
            BusState::Stopping | BusState::Stopped => return Ok(()),
            BusState::Created | BusState::Running => {}
        }
        self.core.set_state(BusState::Stopping);
        info!("event bus stopping");

        self.core.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "broadcast task join failed");
            }
        }

        let closed = self.core.registry.clear();
        {
            let mut history = self
                .core
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *history = EventHistory::new(self.core.history_capacity);
        }
        self.core.set_state(BusState::Stopped);
        info!(subscriptions_closed = closed, "event bus stopped");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        Ok(())
    }

    fn healthy(&self) -> bool {
        matches!(self.core.state(), BusState::Created | BusState::Running)
    }

    fn health_status(&self) -> HealthStatus {
        HealthStatus {
            backend: "local".to_string(),
            mode: HealthMode::Local,
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BlockEvent, TransactionEvent};
    use crate::metrics::testing::CountingMetrics;
    use indexer_types::primitives::{Address, Hash, U256};
    use std::time::Duration;
    use tokio::time::timeout;

    fn block(n: u64) -> ChainEvent {
        BlockEvent::new(n, Hash::repeat_byte((n % 251) as u8), 0).into()
    }

    async fn recv_one(sub: &mut Subscription) -> ChainEvent {
        timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_type_filtering() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        assert!(bus.publish(block(100)));
        assert!(bus.publish(
            TransactionEvent::new(
                Hash::repeat_byte(2),
                100,
                Hash::repeat_byte(1),
                0,
                Address::zero(),
                None,
                U256::zero(),
            )
            .into()
        ));

        let received = recv_one(&mut sub).await;
        assert_eq!(received.event_type(), EventType::Block);
        assert_eq!(received.block_number(), Some(100));

        // Nothing else arrives for this subscriber.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        for n in 1..=20 {
            assert!(bus.publish(block(n)));
        }
        for n in 1..=20 {
            let event = recv_one(&mut sub).await;
            assert_eq!(event.block_number(), Some(n));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_counted() {
        let metrics = Arc::new(CountingMetrics::default());
        let bus = LocalEventBus::with_options(LocalBusOptions {
            publish_buffer_size: 200,
            history_size: DEFAULT_HISTORY_CAPACITY,
            metrics: Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        });
        bus.start().await.unwrap();

        let sub = bus
            .subscribe(
                "slow",
                &[EventType::Block],
                None,
                SubscribeOptions {
                    channel_size: 10,
                    replay_last: 0,
                },
            )
            .unwrap();

        for n in 1..=100 {
            assert!(bus.publish(block(n)));
        }
        // Let the broadcast task drain the queue.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = bus.stats();
        assert_eq!(stats.total_events, 100);
        assert_eq!(stats.total_deliveries, 10);
        assert_eq!(stats.dropped_events, 90);

        let info = bus.subscriber_info("slow").unwrap();
        assert_eq!(info.events_received, 10);
        assert_eq!(info.events_dropped, 90);

        assert_eq!(metrics.published.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.dropped.load(Ordering::Relaxed), 90);
        drop(sub);
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let bus = LocalEventBus::with_capacity(DEFAULT_PUBLISH_BUFFER, 100);
        bus.start().await.unwrap();

        for n in 1..=20 {
            assert!(bus.publish(block(n)));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut sub = bus
            .subscribe(
                "replayer",
                &[EventType::Block],
                None,
                SubscribeOptions {
                    channel_size: 0,
                    replay_last: 5,
                },
            )
            .unwrap();

        assert!(bus.publish(block(21)));

        for expected in [16, 17, 18, 19, 20, 21] {
            let event = recv_one(&mut sub).await;
            assert_eq!(event.block_number(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_replay_capped_at_history_capacity() {
        let bus = LocalEventBus::with_capacity(DEFAULT_PUBLISH_BUFFER, 3);
        bus.start().await.unwrap();

        for n in 1..=10 {
            assert!(bus.publish(block(n)));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut sub = bus
            .subscribe(
                "r",
                &[EventType::Block],
                None,
                SubscribeOptions {
                    channel_size: 0,
                    replay_last: 50,
                },
            )
            .unwrap();

        for expected in [8, 9, 10] {
            let event = recv_one(&mut sub).await;
            assert_eq!(event.block_number(), Some(expected));
        }
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let bus = LocalEventBus::new();
        let _sub = bus
            .subscribe("dup", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();
        let err = bus
            .subscribe("dup", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateSubscription(_)));
    }

    #[tokio::test]
    async fn test_invalid_filter_no_side_effects() {
        let bus = LocalEventBus::new();
        let bad = EventFilter::new().with_block_range(100, 50);
        let err = bus
            .subscribe("x", &[EventType::Block], Some(bad), SubscribeOptions::default())
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidFilter(_)));
        assert_eq!(bus.subscriber_count(), 0);

        // The ID stays available.
        let _ok = bus
            .subscribe("x", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();
        bus.unsubscribe("s").unwrap();
        assert!(matches!(
            bus.unsubscribe("s"),
            Err(BusError::SubscriptionNotFound(_))
        ));

        assert!(timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timeout")
            .is_none());

        // A publish after unsubscribe returns is not delivered to it.
        assert!(bus.publish(block(1)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.stats().total_deliveries, 0);
    }

    #[tokio::test]
    async fn test_publish_with_context_cancellation() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let ctx = CancellationToken::new();
        assert!(bus.publish_with_context(&ctx, block(1)).is_ok());

        ctx.cancel();
        assert!(matches!(
            bus.publish_with_context(&ctx, block(2)),
            Err(BusError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_publish_queue_full_returns_false() {
        // Bus never started: the queue fills and stays full.
        let bus = LocalEventBus::with_capacity(4, 10);
        for n in 1..=4 {
            assert!(bus.publish(block(n)));
        }
        assert!(!bus.publish(block(5)));
    }

    #[tokio::test]
    async fn test_stop_idempotent_and_closes_subscribers() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        bus.stop().await.unwrap();
        bus.stop().await.unwrap();
        assert_eq!(bus.state(), BusState::Stopped);
        assert!(!bus.healthy());

        assert!(!bus.publish(block(1)));
        assert!(timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timeout")
            .is_none());
        assert!(matches!(
            bus.subscribe("t", &[EventType::Block], None, SubscribeOptions::default()),
            Err(BusError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_counters_balance() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let a1 = Address::repeat_byte(0xa1);
        let _all = bus
            .subscribe(
                "all",
                &[EventType::Block, EventType::Transaction],
                None,
                SubscribeOptions::default(),
            )
            .unwrap();
        let _filtered = bus
            .subscribe(
                "filtered",
                &[EventType::Transaction],
                Some(EventFilter::new().with_from_addresses(vec![a1])),
                SubscribeOptions::default(),
            )
            .unwrap();

        assert!(bus.publish(block(1)));
        assert!(bus.publish(
            TransactionEvent::new(
                Hash::repeat_byte(1),
                1,
                Hash::zero(),
                0,
                Address::repeat_byte(0xff),
                None,
                U256::zero(),
            )
            .into()
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = bus.stats();
        assert_eq!(stats.total_events, 2);
        // "all" got both events; "filtered" rejected the transaction.
        assert_eq!(stats.total_deliveries, 2);
        assert_eq!(stats.filtered_events, 1);
        assert_eq!(stats.dropped_events, 0);
    }

    #[tokio::test]
    async fn test_generated_id_when_empty() {
        let bus = LocalEventBus::new();
        let sub = bus
            .subscribe("", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();
        assert!(!sub.id().is_empty());
        assert!(bus.subscriber_info(sub.id()).is_some());
    }
}
