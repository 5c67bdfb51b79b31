//! # Wire Codec
//!
//! Envelope encoding for cross-node transport. The wire shape is a UTF-8
//! JSON object `{"type": <string>, "timestamp": <RFC3339Nano>, "data":
//! <variant body>}`.
//!
//! Heavy in-process references (full blocks, receipts) are not serialized;
//! subscribers on other nodes refetch by hash when they need them.

use crate::error::BusError;
use crate::events::{
    BlockEvent, ChainConfigEvent, ChainEvent, ConsensusBlockEvent, ConsensusErrorEvent,
    ConsensusForkEvent, ConsensusValidatorChangeEvent, EventType, LogEvent, SystemContractEvent,
    TransactionEvent, ValidatorSetEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The wire envelope.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    /// Event type tag, wire-named.
    #[serde(rename = "type")]
    event_type: String,
    /// Event creation time, RFC3339 with nanoseconds.
    timestamp: DateTime<Utc>,
    /// The variant body.
    data: serde_json::Value,
}

/// Encode an event into envelope bytes.
pub fn encode_event(event: &ChainEvent) -> Result<Vec<u8>, BusError> {
    let data = match event {
        ChainEvent::Block(e) => serde_json::to_value(e),
        ChainEvent::Transaction(e) => serde_json::to_value(e),
        ChainEvent::Log(e) => serde_json::to_value(e),
        ChainEvent::ChainConfig(e) => serde_json::to_value(e),
        ChainEvent::ValidatorSet(e) => serde_json::to_value(e),
        ChainEvent::SystemContract(e) => serde_json::to_value(e),
        ChainEvent::ConsensusBlock(e) => serde_json::to_value(e),
        ChainEvent::ConsensusFork(e) => serde_json::to_value(e),
        ChainEvent::ConsensusValidatorChange(e) => serde_json::to_value(e),
        ChainEvent::ConsensusError(e) => serde_json::to_value(e),
    }
    .map_err(|e| BusError::SerializationFailed(e.to_string()))?;

    let envelope = WireEnvelope {
        event_type: event.event_type().as_str().to_string(),
        timestamp: event.timestamp(),
        data,
    };
    serde_json::to_vec(&envelope).map_err(|e| BusError::SerializationFailed(e.to_string()))
}

/// Decode envelope bytes back into an event.
pub fn decode_event(bytes: &[u8]) -> Result<ChainEvent, BusError> {
    let envelope: WireEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| BusError::DeserializationFailed(e.to_string()))?;

    let event_type: EventType = envelope
        .event_type
        .parse()
        .map_err(|_| BusError::InvalidEventType(envelope.event_type.clone()))?;

    let data = envelope.data;
    let decode_err = |e: serde_json::Error| BusError::DeserializationFailed(e.to_string());

    let event = match event_type {
        EventType::Block => {
            ChainEvent::Block(serde_json::from_value::<BlockEvent>(data).map_err(decode_err)?)
        }
        EventType::Transaction => ChainEvent::Transaction(
            serde_json::from_value::<TransactionEvent>(data).map_err(decode_err)?,
        ),
        EventType::Log => {
            ChainEvent::Log(serde_json::from_value::<LogEvent>(data).map_err(decode_err)?)
        }
        EventType::ChainConfig => ChainEvent::ChainConfig(
            serde_json::from_value::<ChainConfigEvent>(data).map_err(decode_err)?,
        ),
        EventType::ValidatorSet => ChainEvent::ValidatorSet(
            serde_json::from_value::<ValidatorSetEvent>(data).map_err(decode_err)?,
        ),
        EventType::SystemContract => ChainEvent::SystemContract(
            serde_json::from_value::<SystemContractEvent>(data).map_err(decode_err)?,
        ),
        EventType::ConsensusBlock => ChainEvent::ConsensusBlock(
            serde_json::from_value::<ConsensusBlockEvent>(data).map_err(decode_err)?,
        ),
        EventType::ConsensusFork => ChainEvent::ConsensusFork(
            serde_json::from_value::<ConsensusForkEvent>(data).map_err(decode_err)?,
        ),
        EventType::ConsensusValidatorChange => ChainEvent::ConsensusValidatorChange(
            serde_json::from_value::<ConsensusValidatorChangeEvent>(data).map_err(decode_err)?,
        ),
        EventType::ConsensusError => ChainEvent::ConsensusError(
            serde_json::from_value::<ConsensusErrorEvent>(data).map_err(decode_err)?,
        ),
    };
    Ok(event)
}
