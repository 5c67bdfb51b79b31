//! # Subscriptions
//!
//! The subscription registry and the handle subscribers receive.
//!
//! Ownership: the bus exclusively owns the registry entry (and with it the
//! send half of the channel); the subscriber owns the receive half. The
//! channel is closed exactly once, by the bus, when the entry is removed:
//! on unsubscribe, on handle drop, or at shutdown.

use crate::error::BusError;
use crate::events::{ChainEvent, EventType};
use crate::filter::EventFilter;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// Options accepted at subscribe time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Capacity of the subscription channel. Zero is coerced to the
    /// default (100).
    pub channel_size: usize,
    /// Number of ring-buffer events to replay before live delivery.
    /// Capped at the ring capacity.
    pub replay_last: usize,
}

/// Per-subscription delivery counters.
///
/// The broadcast task is the only writer; info queries read concurrently,
/// so everything is atomic.
#[derive(Debug)]
pub struct SubscriberStats {
    /// When the subscription was registered.
    pub created_at: DateTime<Utc>,
    /// Events successfully handed to the channel.
    pub events_received: AtomicU64,
    /// Events dropped because the channel was full.
    pub events_dropped: AtomicU64,
    /// Wall clock of the last successful delivery, in Unix nanoseconds.
    /// Zero until the first delivery. Not advanced on drops.
    pub last_event_nanos: AtomicI64,
}

impl SubscriberStats {
    pub(crate) fn new() -> Self {
        Self {
            created_at: Utc::now(),
            events_received: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_event_nanos: AtomicI64::new(0),
        }
    }

    pub(crate) fn record_delivery(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        self.last_event_nanos.store(nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// The last delivery instant, when one has happened.
    #[must_use]
    pub fn last_event_time(&self) -> Option<DateTime<Utc>> {
        let nanos = self.last_event_nanos.load(Ordering::Relaxed);
        if nanos == 0 {
            return None;
        }
        Some(Utc.timestamp_nanos(nanos))
    }
}

/// A point-in-time view of one subscription, for info queries.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    /// Subscription ID.
    pub id: String,
    /// Types the subscription accepts.
    pub event_types: Vec<EventType>,
    /// Whether a filter is attached.
    pub has_filter: bool,
    /// Capacity of the subscription channel.
    pub channel_size: usize,
    /// When the subscription was registered.
    pub created_at: DateTime<Utc>,
    /// Events successfully delivered.
    pub events_received: u64,
    /// Events dropped on channel-full.
    pub events_dropped: u64,
    /// Wall clock of the last successful delivery.
    pub last_event_time: Option<DateTime<Utc>>,
}

/// The bus-owned half of a subscription.
pub(crate) struct SubscriptionEntry {
    pub(crate) id: String,
    pub(crate) types: HashSet<EventType>,
    pub(crate) filter: Option<EventFilter>,
    pub(crate) sender: mpsc::Sender<ChainEvent>,
    pub(crate) channel_size: usize,
    pub(crate) stats: Arc<SubscriberStats>,
}

impl SubscriptionEntry {
    pub(crate) fn info(&self) -> SubscriberInfo {
        let mut event_types: Vec<EventType> = self.types.iter().copied().collect();
        event_types.sort_by_key(EventType::as_str);
        SubscriberInfo {
            id: self.id.clone(),
            event_types,
            has_filter: self.filter.is_some(),
            channel_size: self.channel_size,
            created_at: self.stats.created_at,
            events_received: self.stats.events_received.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
            last_event_time: self.stats.last_event_time(),
        }
    }
}

/// Registry of live subscriptions.
///
/// Readers are the broadcast task and info queries; writers are
/// subscribe, unsubscribe, and shutdown.
pub(crate) struct SubscriptionRegistry {
    subs: RwLock<HashMap<String, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            subs: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SubscriptionEntry>> {
        self.subs.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SubscriptionEntry>> {
        self.subs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove an entry, dropping the send half (which closes the channel).
    pub(crate) fn remove(&self, id: &str) -> Option<SubscriptionEntry> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            debug!(subscription = id, "subscription removed");
        }
        removed
    }

    /// Remove every entry, closing all channels. Used at shutdown.
    pub(crate) fn clear(&self) -> usize {
        let mut guard = self.write();
        let n = guard.len();
        guard.clear();
        n
    }

    pub(crate) fn count(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn info(&self, id: &str) -> Option<SubscriberInfo> {
        self.read().get(id).map(SubscriptionEntry::info)
    }

    pub(crate) fn all_info(&self) -> Vec<SubscriberInfo> {
        let mut infos: Vec<SubscriberInfo> =
            self.read().values().map(SubscriptionEntry::info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}

/// Removes the registry entry when the subscriber side goes away.
#[derive(Debug)]
struct UnsubscribeGuard {
    id: String,
    registry: Weak<SubscriptionRegistry>,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}

/// The subscriber's handle: the receive half of the channel plus the
/// subscription identity and counters.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<ChainEvent>,
    types: HashSet<EventType>,
    stats: Arc<SubscriberStats>,
    guard: UnsubscribeGuard,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        types: HashSet<EventType>,
        receiver: mpsc::Receiver<ChainEvent>,
        stats: Arc<SubscriberStats>,
        registry: Weak<SubscriptionRegistry>,
    ) -> Self {
        Self {
            receiver,
            types,
            stats,
            guard: UnsubscribeGuard { id, registry },
        }
    }

    /// The subscription ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.guard.id
    }

    /// The types this subscription accepts.
    #[must_use]
    pub fn event_types(&self) -> &HashSet<EventType> {
        &self.types
    }

    /// Delivery counters for this subscription.
    #[must_use]
    pub fn stats(&self) -> &SubscriberStats {
        &self.stats
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the bus has closed the channel (unsubscribe or
    /// shutdown) and the buffer is drained.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Result<Option<ChainEvent>, BusError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BusError::ChannelClosed),
        }
    }

    /// Convert into a [`Stream`] of events for combinator-style consumers.
    #[must_use]
    pub fn into_stream(self) -> SubscriptionStream {
        SubscriptionStream {
            inner: ReceiverStream::new(self.receiver),
            _guard: self.guard,
        }
    }
}

/// Stream adapter over a subscription. Dropping the stream unsubscribes,
/// same as dropping the handle it came from.
pub struct SubscriptionStream {
    inner: ReceiverStream<ChainEvent>,
    _guard: UnsubscribeGuard,
}

impl Stream for SubscriptionStream {
    type Item = ChainEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BlockEvent;
    use indexer_types::primitives::Hash;

    fn entry(id: &str, sender: mpsc::Sender<ChainEvent>) -> SubscriptionEntry {
        SubscriptionEntry {
            id: id.to_string(),
            types: HashSet::from([EventType::Block]),
            filter: None,
            sender,
            channel_size: 4,
            stats: Arc::new(SubscriberStats::new()),
        }
    }

    #[test]
    fn test_registry_insert_remove() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.write().insert("a".to_string(), entry("a", tx));

        assert_eq!(registry.count(), 1);
        assert!(registry.info("a").is_some());
        assert!(registry.info("b").is_none());

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_stats_last_event_only_on_delivery() {
        let stats = SubscriberStats::new();
        assert!(stats.last_event_time().is_none());

        stats.record_drop();
        assert!(stats.last_event_time().is_none());
        assert_eq!(stats.events_dropped.load(Ordering::Relaxed), 1);

        stats.record_delivery();
        assert!(stats.last_event_time().is_some());
        assert_eq!(stats.events_received.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_subscription_drop_removes_entry() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        registry.write().insert("s".to_string(), entry("s", tx));

        let sub = Subscription::new(
            "s".to_string(),
            HashSet::from([EventType::Block]),
            rx,
            Arc::new(SubscriberStats::new()),
            Arc::downgrade(&registry),
        );
        assert_eq!(registry.count(), 1);

        drop(sub);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_recv_drains_then_closes() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(
            "s".to_string(),
            HashSet::from([EventType::Block]),
            rx,
            Arc::new(SubscriberStats::new()),
            Arc::downgrade(&registry),
        );

        tx.try_send(BlockEvent::new(1, Hash::zero(), 0).into())
            .unwrap();
        drop(tx);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_recv() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(
            "s".to_string(),
            HashSet::from([EventType::Block]),
            rx,
            Arc::new(SubscriberStats::new()),
            Arc::downgrade(&registry),
        );

        assert!(matches!(sub.try_recv(), Ok(None)));

        tx.try_send(BlockEvent::new(1, Hash::zero(), 0).into())
            .unwrap();
        assert!(matches!(sub.try_recv(), Ok(Some(_))));

        drop(tx);
        assert!(matches!(sub.try_recv(), Err(BusError::ChannelClosed)));
    }
}
