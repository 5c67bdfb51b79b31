//! # Bus Configuration
//!
//! YAML-backed configuration with environment overrides: environment
//! variables override file values, defaults fill the remaining gaps.
//!
//! The factory (`factory.rs`) turns a validated [`BusConfig`] into a
//! running backend.

use crate::error::BusError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Accepted compression codecs for the partitioned-log producer.
pub const KAFKA_COMPRESSION_CODECS: [&str; 5] = ["none", "gzip", "snappy", "lz4", "zstd"];

/// Accepted `required_acks` settings for the partitioned-log producer.
pub const KAFKA_REQUIRED_ACKS: [&str; 3] = ["0", "1", "all"];

/// Accepted SASL mechanisms for the partitioned-log backend.
pub const KAFKA_SASL_MECHANISMS: [&str; 3] = ["PLAIN", "SCRAM-SHA-256", "SCRAM-SHA-512"];

/// Which backend the factory should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process bus only.
    Local,
    /// Local bus + Redis pub/sub fan-out.
    Redis,
    /// Local bus + Kafka partitioned-log fan-out.
    Kafka,
    /// Prefer Redis when enabled, else Kafka, else local.
    Hybrid,
}

impl FromStr for BackendKind {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            "kafka" => Ok(Self::Kafka),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(BusError::InvalidConfiguration(format!(
                "unknown bus type: {other}"
            ))),
        }
    }
}

/// TLS settings shared by both remote backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS on the connection.
    pub enabled: bool,
    /// Skip certificate verification. Test environments only.
    pub insecure_skip_verify: bool,
    /// Expected server name, when it differs from the dialed host.
    pub server_name: Option<String>,
    /// CA bundle path.
    pub ca_file: Option<PathBuf>,
    /// Client certificate path.
    pub cert_file: Option<PathBuf>,
    /// Client key path.
    pub key_file: Option<PathBuf>,
}

/// Redis pub/sub backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Enable the Redis backend.
    pub enabled: bool,
    /// Server addresses (`host:port`). The first is dialed; in cluster
    /// mode pub/sub propagates cluster-wide, so one entry point suffices.
    pub addresses: Vec<String>,
    /// Treat the addresses as a cluster.
    pub cluster_mode: bool,
    /// Channel prefix; events publish on `<prefix>:<event type>`.
    pub channel_prefix: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Minimum idle connections to keep.
    pub min_idle_conns: u32,
    /// Dial timeout.
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
    /// Read timeout.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Write timeout.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// TLS settings.
    pub tls: TlsConfig,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses: vec!["localhost:6379".to_string()],
            cluster_mode: false,
            channel_prefix: "indexer:events".to_string(),
            pool_size: 10,
            min_idle_conns: 2,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            tls: TlsConfig::default(),
        }
    }
}

/// Kafka partitioned-log backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Enable the Kafka backend.
    pub enabled: bool,
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Topic events are written to.
    pub topic: String,
    /// Consumer group for the inbound reader.
    pub group_id: String,
    /// Producer batch size (messages).
    pub batch_size: usize,
    /// Producer linger in milliseconds.
    pub linger_ms: u64,
    /// Producer acknowledgement level: `0`, `1`, or `all`.
    pub required_acks: String,
    /// Compression codec: `none`, `gzip`, `snappy`, `lz4`, `zstd`.
    pub compression: String,
    /// SASL mechanism, empty to disable: `PLAIN`, `SCRAM-SHA-256`,
    /// `SCRAM-SHA-512`.
    pub sasl_mechanism: String,
    /// SASL username.
    pub sasl_username: String,
    /// SASL password.
    pub sasl_password: String,
    /// TLS settings.
    pub tls: TlsConfig,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: vec!["localhost:9092".to_string()],
            topic: "indexer-events".to_string(),
            group_id: "indexer".to_string(),
            batch_size: 100,
            linger_ms: 10,
            required_acks: "1".to_string(),
            compression: "none".to_string(),
            sasl_mechanism: String::new(),
            sasl_username: String::new(),
            sasl_password: String::new(),
            tls: TlsConfig::default(),
        }
    }
}

/// Identity of this indexer node, used for cross-node echo suppression.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeIdentity {
    /// Node identifier carried in every outbound envelope. Generated when
    /// left empty.
    pub id: String,
}

/// Complete bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Backend selector: `local`, `redis`, `kafka`, or `hybrid`.
    #[serde(rename = "type")]
    pub backend: String,
    /// Publish queue capacity.
    pub publish_buffer_size: usize,
    /// Replay ring capacity.
    pub history_size: usize,
    /// Node identity.
    pub node: NodeIdentity,
    /// Redis backend settings.
    pub redis: RedisConfig,
    /// Kafka backend settings.
    pub kafka: KafkaConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            publish_buffer_size: crate::DEFAULT_PUBLISH_BUFFER,
            history_size: crate::DEFAULT_HISTORY_CAPACITY,
            node: NodeIdentity::default(),
            redis: RedisConfig::default(),
            kafka: KafkaConfig::default(),
        }
    }
}

impl BusConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, BusError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BusError::InvalidConfiguration(format!("yaml parse failed: {e}")))
    }

    /// Load a YAML file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, BusError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BusError::InvalidConfiguration(format!("read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// The parsed backend selector.
    pub fn backend_kind(&self) -> Result<BackendKind, BusError> {
        self.backend.parse()
    }

    /// The node ID, generating a stable-for-this-process fallback when the
    /// configured one is empty.
    #[must_use]
    pub fn node_id(&self) -> String {
        if !self.node.id.is_empty() {
            return self.node.id.clone();
        }
        let host = env::var("HOSTNAME").unwrap_or_else(|_| "indexer".to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{host}-{}", &suffix[..8])
    }

    /// Overlay environment variables onto this configuration.
    ///
    /// Recognized variables mirror the YAML keys with an `INDEXER_` prefix
    /// (`INDEXER_BUS_TYPE`, `INDEXER_REDIS_ADDRESSES`, ...). List values
    /// are comma-separated.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("INDEXER_BUS_TYPE") {
            self.backend = v;
        }
        if let Ok(v) = env::var("INDEXER_BUS_PUBLISH_BUFFER_SIZE") {
            if let Ok(n) = v.parse() {
                self.publish_buffer_size = n;
            }
        }
        if let Ok(v) = env::var("INDEXER_BUS_HISTORY_SIZE") {
            if let Ok(n) = v.parse() {
                self.history_size = n;
            }
        }
        if let Ok(v) = env::var("INDEXER_NODE_ID") {
            self.node.id = v;
        }

        if let Ok(v) = env::var("INDEXER_REDIS_ENABLED") {
            self.redis.enabled = parse_bool(&v);
        }
        if let Ok(v) = env::var("INDEXER_REDIS_ADDRESSES") {
            self.redis.addresses = split_list(&v);
        }
        if let Ok(v) = env::var("INDEXER_REDIS_CHANNEL_PREFIX") {
            self.redis.channel_prefix = v;
        }

        if let Ok(v) = env::var("INDEXER_KAFKA_ENABLED") {
            self.kafka.enabled = parse_bool(&v);
        }
        if let Ok(v) = env::var("INDEXER_KAFKA_BROKERS") {
            self.kafka.brokers = split_list(&v);
        }
        if let Ok(v) = env::var("INDEXER_KAFKA_TOPIC") {
            self.kafka.topic = v;
        }
        if let Ok(v) = env::var("INDEXER_KAFKA_GROUP_ID") {
            self.kafka.group_id = v;
        }
        if let Ok(v) = env::var("INDEXER_KAFKA_SASL_USERNAME") {
            self.kafka.sasl_username = v;
        }
        if let Ok(v) = env::var("INDEXER_KAFKA_SASL_PASSWORD") {
            self.kafka.sasl_password = v;
        }
    }

    /// Reject malformed configurations. Zero sizes are coerced to their
    /// defaults rather than rejected.
    pub fn validate(&self) -> Result<(), BusError> {
        self.backend_kind()?;

        if self.redis.enabled && self.redis.addresses.is_empty() {
            return Err(BusError::InvalidConfiguration(
                "redis enabled with no addresses".to_string(),
            ));
        }

        if self.kafka.enabled {
            if self.kafka.brokers.is_empty() {
                return Err(BusError::InvalidConfiguration(
                    "kafka enabled with no brokers".to_string(),
                ));
            }
            if self.kafka.topic.is_empty() {
                return Err(BusError::InvalidConfiguration(
                    "kafka enabled with no topic".to_string(),
                ));
            }
        }
        if !KAFKA_COMPRESSION_CODECS.contains(&self.kafka.compression.as_str()) {
            return Err(BusError::InvalidConfiguration(format!(
                "unknown kafka compression: {}",
                self.kafka.compression
            )));
        }
        if !KAFKA_REQUIRED_ACKS.contains(&self.kafka.required_acks.as_str()) {
            return Err(BusError::InvalidConfiguration(format!(
                "unknown kafka required_acks: {}",
                self.kafka.required_acks
            )));
        }
        if !self.kafka.sasl_mechanism.is_empty()
            && !KAFKA_SASL_MECHANISMS.contains(&self.kafka.sasl_mechanism.as_str())
        {
            return Err(BusError::InvalidConfiguration(format!(
                "unknown kafka sasl mechanism: {}",
                self.kafka.sasl_mechanism
            )));
        }
        Ok(())
    }

    /// Publish queue capacity with the zero-coercion applied.
    #[must_use]
    pub fn effective_publish_buffer(&self) -> usize {
        if self.publish_buffer_size == 0 {
            crate::DEFAULT_PUBLISH_BUFFER
        } else {
            self.publish_buffer_size
        }
    }

    /// History capacity with the zero-coercion applied.
    #[must_use]
    pub fn effective_history_size(&self) -> usize {
        if self.history_size == 0 {
            crate::DEFAULT_HISTORY_CAPACITY
        } else {
            self.history_size
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
