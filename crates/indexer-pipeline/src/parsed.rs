//! # Parsed Events
//!
//! The normalized record a contract parser produces from one raw log.

use chrono::{DateTime, Utc};
use indexer_types::decoded::DecodedFields;
use indexer_types::entities::Log;
use indexer_types::primitives::{Address, Hash};
use serde::{Deserialize, Serialize};

/// A decoded contract log, ready for handler dispatch, storage, and
/// publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    /// Address of the emitting contract.
    pub contract_address: Address,
    /// Registered name of the emitting contract.
    pub contract_name: String,
    /// Decoded event name (e.g. `Transfer`).
    pub event_name: String,
    /// Event signature hash (`topics[0]`).
    pub event_sig: Hash,
    /// Number of the block containing the log.
    pub block_number: u64,
    /// Hash of the emitting transaction.
    pub tx_hash: Hash,
    /// Index of the log within the block.
    pub log_index: u32,
    /// Decoded inputs by name.
    pub data: DecodedFields,
    /// The raw log this event was decoded from.
    pub raw_log: Log,
    /// When the parser produced this record.
    pub timestamp: DateTime<Utc>,
}

impl ParsedEvent {
    /// Build a parsed event from a decoded log. Block number, transaction
    /// hash, and log index come from the raw log; the timestamp is stamped
    /// here.
    #[must_use]
    pub fn from_log(
        contract_name: impl Into<String>,
        event_name: impl Into<String>,
        event_sig: Hash,
        data: DecodedFields,
        raw_log: Log,
    ) -> Self {
        Self {
            contract_address: raw_log.address,
            contract_name: contract_name.into(),
            event_name: event_name.into(),
            event_sig,
            block_number: raw_log.block_number,
            tx_hash: raw_log.tx_hash,
            log_index: raw_log.log_index,
            data,
            raw_log,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_log_copies_positions() {
        let mut log = Log::default();
        log.address = Address::repeat_byte(0x42);
        log.block_number = 99;
        log.tx_hash = Hash::repeat_byte(0x17);
        log.log_index = 4;

        let event = ParsedEvent::from_log(
            "StakingContract",
            "StakeDeposited",
            Hash::repeat_byte(0xab),
            HashMap::new(),
            log,
        );

        assert_eq!(event.contract_address, Address::repeat_byte(0x42));
        assert_eq!(event.block_number, 99);
        assert_eq!(event.tx_hash, Hash::repeat_byte(0x17));
        assert_eq!(event.log_index, 4);
        assert_eq!(event.event_name, "StakeDeposited");
    }
}
