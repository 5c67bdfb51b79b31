//! # Redis Pub/Sub Adapter
//!
//! Wraps the local bus and fans every accepted publish out to a Redis
//! channel per event type (`<prefix>:<event type>`). A single receive task
//! subscribes to all channels and re-publishes inbound events locally.
//!
//! Cross-node loop prevention: every outbound payload carries this node's
//! identifier; inbound payloads with our own identifier are dropped before
//! the inner envelope is decoded.
//!
//! When the broker is unreachable the adapter stays usable as a local-only
//! bus (degraded mode).

use crate::bus::{BusStats, EventBus, HealthMode, HealthStatus, LocalEventBus};
use crate::codec;
use crate::config::RedisConfig;
use crate::error::BusError;
use crate::events::{ChainEvent, EventType};
use crate::filter::EventFilter;
use crate::remote::{RemoteDelivery, RemoteStats};
use crate::subscription::{SubscribeOptions, SubscriberInfo, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outer payload published on the broker channel.
///
/// The `data` member holds the wire envelope verbatim; `RawValue` keeps it
/// byte-identical through the outer encode/decode.
#[derive(Serialize, Deserialize)]
struct RemotePayload {
    node_id: String,
    data: Box<RawValue>,
}

struct RedisShared {
    local: Arc<LocalEventBus>,
    node_id: String,
    channel_prefix: String,
    connected: AtomicBool,
    publish_errors: AtomicU64,
    echoes_skipped: AtomicU64,
    remote_received: AtomicU64,
}

impl RedisShared {
    /// Handle one raw message from the broker. Echo check happens before
    /// the inner envelope is decoded; surviving events are published on
    /// the local bus only (no re-forwarding).
    fn handle_remote_payload(&self, payload: &[u8]) -> Result<RemoteDelivery, BusError> {
        let outer: RemotePayload = serde_json::from_slice(payload)
            .map_err(|e| BusError::DeserializationFailed(e.to_string()))?;

        if outer.node_id == self.node_id {
            self.echoes_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(RemoteDelivery::Echo);
        }

        let event = codec::decode_event(outer.data.get().as_bytes())?;
        if self.local.publish(event) {
            self.remote_received.fetch_add(1, Ordering::Relaxed);
            Ok(RemoteDelivery::Delivered)
        } else {
            Ok(RemoteDelivery::LocalPublishFailed)
        }
    }
}

/// Event bus backed by the local broadcaster plus Redis pub/sub fan-out.
pub struct RedisEventBus {
    shared: Arc<RedisShared>,
    config: RedisConfig,
    publisher: Mutex<Option<ConnectionManager>>,
    receive_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    receive_cancel: Mutex<Option<CancellationToken>>,
    degraded_detail: Mutex<Option<String>>,
}

impl RedisEventBus {
    /// Wrap a local bus. The adapter exclusively owns the local bus.
    #[must_use]
    pub fn new(local: LocalEventBus, config: RedisConfig, node_id: impl Into<String>) -> Self {
        let channel_prefix = config.channel_prefix.clone();
        Self {
            shared: Arc::new(RedisShared {
                local: Arc::new(local),
                node_id: node_id.into(),
                channel_prefix,
                connected: AtomicBool::new(false),
                publish_errors: AtomicU64::new(0),
                echoes_skipped: AtomicU64::new(0),
                remote_received: AtomicU64::new(0),
            }),
            config,
            publisher: Mutex::new(None),
            receive_task: tokio::sync::Mutex::new(None),
            receive_cancel: Mutex::new(None),
            degraded_detail: Mutex::new(None),
        }
    }

    /// The node identifier carried in outbound payloads.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.shared.node_id
    }

    /// The broker channel for one event type.
    #[must_use]
    pub fn channel_for(&self, event_type: EventType) -> String {
        format!("{}:{}", self.shared.channel_prefix, event_type.as_str())
    }

    /// Remote-side counters.
    #[must_use]
    pub fn remote_stats(&self) -> RemoteStats {
        RemoteStats {
            connected: self.shared.connected.load(Ordering::Acquire),
            publish_errors: self.shared.publish_errors.load(Ordering::Relaxed),
            echoes_skipped: self.shared.echoes_skipped.load(Ordering::Relaxed),
            remote_received: self.shared.remote_received.load(Ordering::Relaxed),
        }
    }

    /// Feed one inbound broker message through the receive path. The
    /// receive task uses this; tests drive it directly.
    pub fn handle_remote_payload(&self, payload: &[u8]) -> Result<RemoteDelivery, BusError> {
        self.shared.handle_remote_payload(payload)
    }

    /// Probe the broker, subscribe to every event-type channel, and start
    /// the receive task. On failure the adapter remains usable locally.
    pub async fn connect(&self, connect_timeout: Duration) -> Result<(), BusError> {
        if self.shared.connected.load(Ordering::Acquire) {
            return Err(BusError::AlreadyConnected);
        }

        match tokio::time::timeout(connect_timeout, self.connect_inner()).await {
            Ok(Ok(())) => {
                self.shared.connected.store(true, Ordering::Release);
                self.set_degraded_detail(None);
                info!(node_id = %self.shared.node_id, "redis event bus connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_degraded_detail(Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                let err = BusError::ConnectionFailed(format!(
                    "redis connect timed out after {connect_timeout:?}"
                ));
                self.set_degraded_detail(Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn connect_inner(&self) -> Result<(), BusError> {
        let url = self.broker_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| BusError::ConnectionFailed(format!("redis client: {e}")))?;

        let mut manager =
            tokio::time::timeout(self.config.dial_timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| BusError::ConnectionFailed("redis dial timed out".to_string()))?
                .map_err(|e| BusError::ConnectionFailed(format!("redis dial: {e}")))?;

        // Liveness probe before we claim the connection is usable.
        let pong: String = tokio::time::timeout(
            self.config.read_timeout,
            redis::cmd("PING").query_async(&mut manager),
        )
        .await
        .map_err(|_| BusError::ConnectionFailed("redis ping timed out".to_string()))?
        .map_err(|e| BusError::ConnectionFailed(format!("redis ping: {e}")))?;
        debug!(response = %pong, "redis liveness probe");

        let conn = tokio::time::timeout(self.config.dial_timeout, client.get_async_connection())
            .await
            .map_err(|_| BusError::ConnectionFailed("redis pubsub dial timed out".to_string()))?
            .map_err(|e| BusError::ConnectionFailed(format!("redis pubsub dial: {e}")))?;
        let mut pubsub = conn.into_pubsub();
        for event_type in EventType::ALL {
            pubsub
                .subscribe(self.channel_for(event_type))
                .await
                .map_err(|e| BusError::ConnectionFailed(format!("redis subscribe: {e}")))?;
        }

        // One receive task for all channels, tied to the bus lifetime.
        let cancel = self.shared.local.cancel_token().child_token();
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    next = stream.next() => {
                        let Some(msg) = next else { break };
                        let payload: Vec<u8> = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "redis message payload read failed");
                                continue;
                            }
                        };
                        match shared.handle_remote_payload(&payload) {
                            Ok(RemoteDelivery::Echo) => {}
                            Ok(RemoteDelivery::Delivered) => {}
                            Ok(RemoteDelivery::LocalPublishFailed) => {
                                warn!("inbound remote event dropped: local publish queue full");
                            }
                            Err(e) => {
                                warn!(error = %e, "inbound remote event rejected");
                            }
                        }
                    }
                }
            }
            shared.connected.store(false, Ordering::Release);
            debug!("redis receive task exited");
        });

        *self
            .receive_task
            .lock()
            .await = Some(handle);
        *self
            .receive_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel);
        *self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(manager);
        Ok(())
    }

    fn broker_url(&self) -> Result<String, BusError> {
        let addr = self.config.addresses.first().ok_or_else(|| {
            BusError::InvalidConfiguration("redis backend has no addresses".to_string())
        })?;
        if self.config.cluster_mode {
            // Pub/sub propagates cluster-wide, so one entry point suffices.
            debug!("redis cluster mode: dialing first address for pub/sub");
        }
        let scheme = if self.config.tls.enabled { "rediss" } else { "redis" };
        if self.config.tls.insecure_skip_verify {
            warn!("redis tls.insecure_skip_verify is not supported by this client; ignoring");
        }
        Ok(format!("{scheme}://{addr}"))
    }

    fn set_degraded_detail(&self, detail: Option<String>) {
        *self
            .degraded_detail
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = detail;
    }

    fn degraded_detail(&self) -> Option<String> {
        self.degraded_detail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fire-and-forget remote fan-out for one locally accepted event.
    fn forward_remote(&self, event: ChainEvent) {
        let manager = {
            let guard = self.publisher.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let Some(mut manager) = manager else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        let channel = self.channel_for(event.event_type());
        let write_timeout = self.config.write_timeout;
        tokio::spawn(async move {
            let envelope = match codec::encode_event(&event) {
                Ok(bytes) => bytes,
                Err(e) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "remote publish: envelope encode failed");
                    return;
                }
            };
            let raw = match String::from_utf8(envelope)
                .map_err(|e| e.to_string())
                .and_then(|s| RawValue::from_string(s).map_err(|e| e.to_string()))
            {
                Ok(raw) => raw,
                Err(e) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "remote publish: raw envelope wrap failed");
                    return;
                }
            };
            let payload = RemotePayload {
                node_id: shared.node_id.clone(),
                data: raw,
            };
            let bytes = match serde_json::to_vec(&payload) {
                Ok(b) => b,
                Err(e) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "remote publish: payload encode failed");
                    return;
                }
            };
            // Remote failures are counted, never surfaced to the publisher.
            match tokio::time::timeout(write_timeout, manager.publish::<_, _, ()>(channel, bytes))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "remote publish failed");
                }
                Err(_) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("remote publish timed out");
                }
            }
        });
    }

    async fn teardown_remote(&self) {
        let cancel = {
            let mut guard = self
                .receive_cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = self.receive_task.lock().await.take() {
            let _ = handle.await;
        }
        *self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    fn publish(&self, event: ChainEvent) -> bool {
        // Local delivery decides the outcome; the remote side is
        // best-effort and asynchronous.
        let forward = self
            .shared
            .connected
            .load(Ordering::Acquire)
            .then(|| event.clone());

        if !self.shared.local.publish(event) {
            return false;
        }
        if let Some(event) = forward {
            self.forward_remote(event);
        }
        true
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
        self.shared.local.subscribe(id, types, filter, opts)
    }

    fn unsubscribe(&self, id: &str) -> Result<(), BusError> {
        self.shared.local.unsubscribe(id)
    }

    fn subscriber_count(&self) -> usize {
        self.shared.local.subscriber_count()
    }

    fn subscriber_info(&self, id: &str) -> Option<SubscriberInfo> {
        self.shared.local.subscriber_info(id)
    }

    fn all_subscriber_info(&self) -> Vec<SubscriberInfo> {
        self.shared.local.all_subscriber_info()
    }

    fn stats(&self) -> BusStats {
        self.shared.local.stats()
    }

    async fn start(&self) -> Result<(), BusError> {
        self.shared.local.start().await
    }

    async fn stop(&self) -> Result<(), BusError> {
        self.teardown_remote().await;
        self.shared.local.stop().await
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.teardown_remote().await;
        info!("redis event bus disconnected");
        Ok(())
    }

    fn healthy(&self) -> bool {
        self.shared.local.healthy()
    }

    fn health_status(&self) -> HealthStatus {
        if self.shared.connected.load(Ordering::Acquire) {
            HealthStatus {
                backend: "redis".to_string(),
                mode: HealthMode::Connected,
                detail: None,
            }
        } else {
            HealthStatus {
                backend: "redis".to_string(),
                mode: HealthMode::Degraded,
                detail: self
                    .degraded_detail()
                    .or_else(|| Some("remote backend not connected".to_string())),
            }
        }
    }
}
