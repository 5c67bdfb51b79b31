//! # Parser Registry
//!
//! Maps contract addresses to parsers. Two registration forms:
//!
//! - a [`ContractParser`] implementation with custom decode logic;
//! - an `ethabi::Contract`, decoded generically: `topics[0]` selects the
//!   event by signature, non-indexed inputs unpack from the data payload,
//!   indexed inputs read from the remaining topics by type (indexed
//!   dynamic types surface as their topic hash).
//!
//! Registrations are injected explicitly at composition time; there is no
//! process-global table.

use crate::error::PipelineError;
use crate::parsed::ParsedEvent;
use ethabi::{Contract, RawLog, Token};
use indexer_types::decoded::{DecodedFields, DecodedValue};
use indexer_types::entities::Log;
use indexer_types::primitives::{Address, Hash, U256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Custom decode logic for one contract.
pub trait ContractParser: Send + Sync {
    /// Registered contract name.
    fn contract_name(&self) -> &str;

    /// Decode one log. `Ok(None)` means the log is not one of this
    /// contract's events and should be skipped without error.
    fn parse_log(&self, log: &Log) -> Result<Option<ParsedEvent>, PipelineError>;
}

struct AbiEntry {
    contract_name: String,
    contract: Contract,
}

/// Address-keyed registry of contract parsers and ABIs.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: RwLock<HashMap<Address, Arc<dyn ContractParser>>>,
    abis: RwLock<HashMap<Address, AbiEntry>>,
}

impl ParserRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register custom decode logic for an address.
    pub fn register_parser(
        &self,
        address: Address,
        parser: Arc<dyn ContractParser>,
    ) -> Result<(), PipelineError> {
        if self.is_registered(address) {
            return Err(PipelineError::AlreadyRegistered(address));
        }
        debug!(contract = parser.contract_name(), address = ?address, "parser registered");
        self.parsers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, parser);
        Ok(())
    }

    /// Register an ABI for generic decoding at an address.
    pub fn register_abi(
        &self,
        address: Address,
        contract_name: impl Into<String>,
        contract: Contract,
    ) -> Result<(), PipelineError> {
        if self.is_registered(address) {
            return Err(PipelineError::AlreadyRegistered(address));
        }
        let entry = AbiEntry {
            contract_name: contract_name.into(),
            contract,
        };
        debug!(contract = %entry.contract_name, address = ?address, "abi registered");
        self.abis
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, entry);
        Ok(())
    }

    /// Whether any parser or ABI is registered for the address.
    #[must_use]
    pub fn is_registered(&self, address: Address) -> bool {
        self.parsers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&address)
            || self
                .abis
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&address)
    }

    /// Number of registered addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parsers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
            + self
                .abis
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode one raw log.
    ///
    /// `Ok(None)` when the log's address has no registration, or when a
    /// custom parser declines the log.
    pub fn parse_log(&self, log: &Log) -> Result<Option<ParsedEvent>, PipelineError> {
        let parser = {
            let parsers = self.parsers.read().unwrap_or_else(PoisonError::into_inner);
            parsers.get(&log.address).cloned()
        };
        if let Some(parser) = parser {
            return parser.parse_log(log);
        }

        let abis = self.abis.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = abis.get(&log.address) else {
            return Ok(None);
        };
        decode_abi_log(&entry.contract_name, &entry.contract, log).map(Some)
    }
}

/// Decode a log against a contract ABI.
fn decode_abi_log(
    contract_name: &str,
    contract: &Contract,
    log: &Log,
) -> Result<ParsedEvent, PipelineError> {
    let signature = log.signature_topic().ok_or(PipelineError::NoTopics)?;

    let event = contract
        .events()
        .find(|event| event.signature() == signature)
        .ok_or(PipelineError::UnknownEventSignature(signature))?;

    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.clone(),
    };
    let decoded = event
        .parse_log(raw)
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;

    let mut data: DecodedFields = HashMap::with_capacity(decoded.params.len());
    for param in decoded.params {
        data.insert(param.name, token_to_value(param.value));
    }

    Ok(ParsedEvent::from_log(
        contract_name,
        event.name.clone(),
        signature,
        data,
        log.clone(),
    ))
}

/// Map an ABI token onto the decoded-value model.
fn token_to_value(token: Token) -> DecodedValue {
    match token {
        Token::Address(addr) => DecodedValue::Address(addr),
        Token::FixedBytes(bytes) if bytes.len() == 32 => {
            DecodedValue::Hash(Hash::from_slice(&bytes))
        }
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => DecodedValue::Bytes(bytes),
        Token::Uint(value) => DecodedValue::Uint(value),
        Token::Int(value) => signed_word_to_value(value),
        Token::Bool(flag) => DecodedValue::Bool(flag),
        Token::String(s) => DecodedValue::Str(s),
        Token::FixedArray(items) | Token::Array(items) | Token::Tuple(items) => {
            DecodedValue::List(items.into_iter().map(token_to_value).collect())
        }
    }
}

/// Decode a signed ABI integer from its two's-complement 256-bit word.
///
/// Words whose magnitude exceeds `i64` fall back to the raw word so no
/// information is lost.
fn signed_word_to_value(word: U256) -> DecodedValue {
    // Bit 255 is the sign of the 256-bit two's-complement word.
    if word.bit(255) {
        let magnitude = (!word).overflowing_add(U256::one()).0;
        if magnitude <= U256::from(1u128 << 63) {
            return DecodedValue::Int(-(magnitude.as_u128() as i128) as i64);
        }
    } else if word <= U256::from(i64::MAX as u64) {
        return DecodedValue::Int(word.as_u64() as i64);
    }
    DecodedValue::Uint(word)
}
