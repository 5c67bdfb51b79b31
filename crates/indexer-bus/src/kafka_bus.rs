//! # Kafka Partitioned-Log Adapter
//!
//! Wraps the local bus and writes every accepted publish to a Kafka topic
//! as a keyed record. Per partition key the log preserves write order;
//! across keys ordering is undefined, so subscribers needing per-block
//! ordering for mixed event types must key on block number themselves.
//!
//! The inbound side is a consumer-group reader starting at the log's tail
//! (new messages only), so a restart does not replay broker history. Every
//! node must run its own consumer group to see the full stream.
//!
//! Echo suppression is header-based: the `node_id` header is checked
//! before the payload is ever parsed.

use crate::bus::{BusStats, EventBus, HealthMode, HealthStatus, LocalEventBus};
use crate::codec;
use crate::config::KafkaConfig;
use crate::error::BusError;
use crate::events::{ChainEvent, EventType};
use crate::filter::EventFilter;
use crate::remote::{RemoteDelivery, RemoteStats};
use crate::subscription::{SubscribeOptions, SubscriberInfo, Subscription};
use async_trait::async_trait;
use chrono::SecondsFormat;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Record header carrying the publisher's node identifier.
pub const HEADER_NODE_ID: &str = "node_id";
/// Record header carrying the event type wire name.
pub const HEADER_EVENT_TYPE: &str = "event_type";
/// Record header carrying the event timestamp (RFC3339 nanoseconds).
pub const HEADER_TIMESTAMP: &str = "timestamp";

const PRODUCER_MESSAGE_TIMEOUT_MS: &str = "5000";

struct KafkaShared {
    local: Arc<LocalEventBus>,
    node_id: String,
    connected: AtomicBool,
    publish_errors: AtomicU64,
    echoes_skipped: AtomicU64,
    remote_received: AtomicU64,
}

impl KafkaShared {
    /// Handle one consumed record. The `node_id` header decides echo
    /// suppression before the payload is parsed; surviving events are
    /// published on the local bus only.
    fn handle_record(
        &self,
        node_id_header: Option<&[u8]>,
        payload: Option<&[u8]>,
    ) -> Result<RemoteDelivery, BusError> {
        if let Some(header) = node_id_header {
            if header == self.node_id.as_bytes() {
                self.echoes_skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(RemoteDelivery::Echo);
            }
        }

        let payload = payload.ok_or_else(|| {
            BusError::DeserializationFailed("record has no payload".to_string())
        })?;
        let event = codec::decode_event(payload)?;
        if self.local.publish(event) {
            self.remote_received.fetch_add(1, Ordering::Relaxed);
            Ok(RemoteDelivery::Delivered)
        } else {
            Ok(RemoteDelivery::LocalPublishFailed)
        }
    }
}

/// Event bus backed by the local broadcaster plus Kafka fan-out.
pub struct KafkaEventBus {
    shared: Arc<KafkaShared>,
    config: KafkaConfig,
    producer: Mutex<Option<FutureProducer>>,
    receive_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    receive_cancel: Mutex<Option<CancellationToken>>,
    degraded_detail: Mutex<Option<String>>,
}

impl KafkaEventBus {
    /// Wrap a local bus. The adapter exclusively owns the local bus.
    #[must_use]
    pub fn new(local: LocalEventBus, config: KafkaConfig, node_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(KafkaShared {
                local: Arc::new(local),
                node_id: node_id.into(),
                connected: AtomicBool::new(false),
                publish_errors: AtomicU64::new(0),
                echoes_skipped: AtomicU64::new(0),
                remote_received: AtomicU64::new(0),
            }),
            config,
            producer: Mutex::new(None),
            receive_task: tokio::sync::Mutex::new(None),
            receive_cancel: Mutex::new(None),
            degraded_detail: Mutex::new(None),
        }
    }

    /// The node identifier written into every record's headers.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.shared.node_id
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

    /// Feed one consumed record through the receive path. The receive
    /// task uses this; tests drive it directly.
    pub fn handle_record(
        &self,
        node_id_header: Option<&[u8]>,
        payload: Option<&[u8]>,
    ) -> Result<RemoteDelivery, BusError> {
        self.shared.handle_record(node_id_header, payload)
    }

    /// One configuration builder feeds both halves: common broker,
    /// security, and transport settings applied identically to the
    /// producer and the consumer.
    fn base_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.config.brokers.join(","));
        apply_security(&mut config, &self.config);
        config
    }

    fn build_producer(&self) -> Result<FutureProducer, BusError> {
        let mut config = self.base_client_config();
        config
            .set("message.timeout.ms", PRODUCER_MESSAGE_TIMEOUT_MS)
            .set("acks", &self.config.required_acks)
            .set("compression.type", &self.config.compression)
            .set("batch.num.messages", self.config.batch_size.to_string())
            .set("linger.ms", self.config.linger_ms.to_string());
        config
            .create()
            .map_err(|e| BusError::ConnectionFailed(format!("kafka producer: {e}")))
    }

    fn build_consumer(&self) -> Result<StreamConsumer, BusError> {
        let mut config = self.base_client_config();
        config
            .set("group.id", &self.config.group_id)
            // Tail start: a fresh group sees new records only, so node
            // restarts do not replay broker history.
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "true")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        config
            .create()
            .map_err(|e| BusError::ConnectionFailed(format!("kafka consumer: {e}")))
    }

    /// Create the producer and consumer, probe broker metadata, and start
    /// the receive task. On failure the adapter remains usable locally.
    pub async fn connect(&self, connect_timeout: Duration) -> Result<(), BusError> {
        if self.shared.connected.load(Ordering::Acquire) {
            return Err(BusError::AlreadyConnected);
        }

        match tokio::time::timeout(connect_timeout, self.connect_inner(connect_timeout)).await {
            Ok(Ok(())) => {
                self.shared.connected.store(true, Ordering::Release);
                self.set_degraded_detail(None);
                info!(
                    node_id = %self.shared.node_id,
                    topic = %self.config.topic,
                    "kafka event bus connected"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_degraded_detail(Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                let err = BusError::ConnectionFailed(format!(
                    "kafka connect timed out after {connect_timeout:?}"
                ));
                self.set_degraded_detail(Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn connect_inner(&self, probe_timeout: Duration) -> Result<(), BusError> {
        let producer = self.build_producer()?;

        // Metadata fetch doubles as the liveness probe; it blocks, so it
        // runs off the async threads.
        let probe = producer.clone();
        let topic = self.config.topic.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(Some(&topic), probe_timeout)
        })
        .await
        .map_err(|e| BusError::ConnectionFailed(format!("kafka probe join: {e}")))?
        .map_err(|e| BusError::ConnectionFailed(format!("kafka metadata: {e}")))?;
        debug!(brokers = metadata.brokers().len(), "kafka metadata probe");

        let consumer = self.build_consumer()?;
        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| BusError::ConnectionFailed(format!("kafka subscribe: {e}")))?;

        let cancel = self.shared.local.cancel_token().child_token();
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    next = consumer.recv() => {
                        let msg = match next {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!(error = %e, "kafka receive failed");
                                continue;
                            }
                        };
                        let node_id_header = msg.headers().and_then(|headers| {
                            headers
                                .iter()
                                .find(|h| h.key == HEADER_NODE_ID)
                                .and_then(|h| h.value)
                        });
                        match shared.handle_record(node_id_header, msg.payload()) {
                            Ok(RemoteDelivery::Echo) => {}
                            Ok(RemoteDelivery::Delivered) => {}
                            Ok(RemoteDelivery::LocalPublishFailed) => {
                                warn!("inbound remote event dropped: local publish queue full");
                            }
                            Err(e) => {
                                warn!(error = %e, "inbound remote record rejected");
                            }
                        }
                    }
                }
            }
            shared.connected.store(false, Ordering::Release);
            debug!("kafka receive task exited");
        });

        *self.receive_task.lock().await = Some(handle);
        *self
            .receive_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel);
        *self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(producer);
        Ok(())
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

    /// Fire-and-forget keyed write for one locally accepted event.
    fn forward_remote(&self, event: ChainEvent) {
        let producer = {
            let guard = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let Some(producer) = producer else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        let topic = self.config.topic.clone();
        tokio::spawn(async move {
            let payload = match codec::encode_event(&event) {
                Ok(bytes) => bytes,
                Err(e) => {
                    shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "kafka publish: envelope encode failed");
                    return;
                }
            };
            let key = event.partition_key();
            let timestamp = event
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Nanos, true);
            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: HEADER_NODE_ID,
                    value: Some(shared.node_id.as_bytes()),
                })
                .insert(Header {
                    key: HEADER_EVENT_TYPE,
                    value: Some(event.event_type().as_str().as_bytes()),
                })
                .insert(Header {
                    key: HEADER_TIMESTAMP,
                    value: Some(timestamp.as_bytes()),
                });

            let record = FutureRecord::to(&topic)
                .key(&key)
                .payload(&payload)
                .headers(headers);
            // Remote failures are counted, never surfaced to the publisher.
            if let Err((e, _)) = producer
                .send(record, Timeout::After(Duration::from_secs(5)))
                .await
            {
                shared.publish_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "kafka publish failed");
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
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.connected.store(false, Ordering::Release);
    }
}

/// Apply TLS and SASL settings to a client configuration. The same
/// settings feed both the producer and the consumer.
fn apply_security(config: &mut ClientConfig, kafka: &KafkaConfig) {
    let tls = kafka.tls.enabled;
    let sasl = !kafka.sasl_mechanism.is_empty();
    let protocol = match (tls, sasl) {
        (true, true) => "sasl_ssl",
        (true, false) => "ssl",
        (false, true) => "sasl_plaintext",
        (false, false) => "plaintext",
    };
    config.set("security.protocol", protocol);

    if sasl {
        config
            .set("sasl.mechanism", &kafka.sasl_mechanism)
            .set("sasl.username", &kafka.sasl_username)
            .set("sasl.password", &kafka.sasl_password);
    }
    if tls {
        if let Some(ca) = &kafka.tls.ca_file {
            config.set("ssl.ca.location", ca.display().to_string());
        }
        if let Some(cert) = &kafka.tls.cert_file {
            config.set("ssl.certificate.location", cert.display().to_string());
        }
        if let Some(key) = &kafka.tls.key_file {
            config.set("ssl.key.location", key.display().to_string());
        }
        if kafka.tls.insecure_skip_verify {
            config.set("enable.ssl.certificate.verification", "false");
        }
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    fn publish(&self, event: ChainEvent) -> bool {
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
        info!("kafka event bus disconnected");
        Ok(())
    }

    fn healthy(&self) -> bool {
        self.shared.local.healthy()
    }

    fn health_status(&self) -> HealthStatus {
        if self.shared.connected.load(Ordering::Acquire) {
            HealthStatus {
                backend: "kafka".to_string(),
                mode: HealthMode::Connected,
                detail: None,
            }
        } else {
            HealthStatus {
                backend: "kafka".to_string(),
                mode: HealthMode::Degraded,
                detail: self
                    .degraded_detail()
                    .or_else(|| Some("remote backend not connected".to_string())),
            }
        }
    }
}
