//! # Event Filters
//!
//! Per-subscription predicates over [`ChainEvent`]s. A filter is a bag of
//! optional conditions; `matches` applies the subset of conditions that
//! make sense for the event variant at hand.
//!
//! An empty filter matches every event of the subscribed types. Variants
//! with no filterable conditions (the consensus observation events) never
//! match a non-empty filter; subscribers that want them filtered apply
//! their own predicates on receive.

use crate::error::BusError;
use crate::events::ChainEvent;
use indexer_types::primitives::{Address, Hash, U256};
use serde_json::Value;
use std::collections::HashMap;

/// Key in [`EventFilter::custom_data`] holding the system-contract event
/// names to accept.
pub const CUSTOM_EVENT_TYPES_KEY: &str = "eventTypes";

/// A composable predicate over events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Addresses matched against the variant's primary address: log
    /// emitter, system-contract address, or either side of a transaction.
    pub addresses: Vec<Address>,
    /// Transaction sender addresses.
    pub from_addresses: Vec<Address>,
    /// Transaction recipient addresses. Contract creations never match.
    pub to_addresses: Vec<Address>,
    /// Inclusive lower bound on transaction value.
    pub min_value: Option<U256>,
    /// Inclusive upper bound on transaction value.
    pub max_value: Option<U256>,
    /// Inclusive lower block bound. `0` leaves the side unbounded.
    pub from_block: u64,
    /// Inclusive upper block bound. `0` leaves the side unbounded.
    pub to_block: u64,
    /// Positional topic OR-groups: position `i` matches when the log's
    /// topic `i` is in group `i`. An empty group is a wildcard.
    pub topics: Vec<Vec<Hash>>,
    /// Open map for variant-specific extensions.
    pub custom_data: HashMap<String, Value>,
}

impl EventFilter {
    /// A filter with no conditions. Matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given primary addresses.
    #[must_use]
    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = addresses;
        self
    }

    /// Restrict to transactions sent from the given addresses.
    #[must_use]
    pub fn with_from_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.from_addresses = addresses;
        self
    }

    /// Restrict to transactions sent to the given addresses.
    #[must_use]
    pub fn with_to_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.to_addresses = addresses;
        self
    }

    /// Restrict transaction values to `[min, max]` inclusive.
    #[must_use]
    pub fn with_value_range(mut self, min: U256, max: U256) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Restrict to blocks in `[from, to]` inclusive; `0` leaves a side
    /// unbounded.
    #[must_use]
    pub fn with_block_range(mut self, from: u64, to: u64) -> Self {
        self.from_block = from;
        self.to_block = to;
        self
    }

    /// Append a positional topic OR-group.
    #[must_use]
    pub fn with_topic_group(mut self, group: Vec<Hash>) -> Self {
        self.topics.push(group);
        self
    }

    /// Restrict system-contract events to the given event names.
    #[must_use]
    pub fn with_event_types(mut self, names: &[&str]) -> Self {
        let list = names.iter().map(|n| Value::String((*n).to_string())).collect();
        self.custom_data
            .insert(CUSTOM_EVENT_TYPES_KEY.to_string(), Value::Array(list));
        self
    }

    /// Whether no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
            && self.from_addresses.is_empty()
            && self.to_addresses.is_empty()
            && self.min_value.is_none()
            && self.max_value.is_none()
            && self.from_block == 0
            && self.to_block == 0
            && self.topics.iter().all(Vec::is_empty)
            && self.custom_data.is_empty()
    }

    /// Reject inverted ranges.
    ///
    /// Negative bounds are unrepresentable here (`u64`/`U256`), so only
    /// the inversion checks remain from the reference semantics.
    pub fn validate(&self) -> Result<(), BusError> {
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(BusError::InvalidFilter(format!(
                    "min_value {min} exceeds max_value {max}"
                )));
            }
        }
        if self.from_block != 0 && self.to_block != 0 && self.from_block > self.to_block {
            return Err(BusError::InvalidFilter(format!(
                "from_block {} exceeds to_block {}",
                self.from_block, self.to_block
            )));
        }
        Ok(())
    }

    /// Apply this filter to an event.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        if self.is_empty() {
            return true;
        }

        match event {
            ChainEvent::Block(e) => self.block_in_range(e.number),
            ChainEvent::Transaction(e) => {
                if !self.block_in_range(e.block_number) {
                    return false;
                }
                if !self.addresses.is_empty() {
                    let from_hit = self.addresses.contains(&e.from);
                    let to_hit = e.to.map_or(false, |to| self.addresses.contains(&to));
                    if !from_hit && !to_hit {
                        return false;
                    }
                }
                if !self.from_addresses.is_empty() && !self.from_addresses.contains(&e.from) {
                    return false;
                }
                if !self.to_addresses.is_empty() {
                    // Contract creation has no recipient to match.
                    match e.to {
                        Some(to) if self.to_addresses.contains(&to) => {}
                        _ => return false,
                    }
                }
                self.value_in_range(e.value_u256())
            }
            ChainEvent::Log(e) => {
                if !self.block_in_range(e.log.block_number) {
                    return false;
                }
                if !self.addresses.is_empty() && !self.addresses.contains(&e.log.address) {
                    return false;
                }
                self.topics_match(&e.log.topics)
            }
            ChainEvent::SystemContract(e) => {
                if !self.block_in_range(e.block.number) {
                    return false;
                }
                if !self.addresses.is_empty() && !self.addresses.contains(&e.contract_address) {
                    return false;
                }
                self.event_type_allowed(e.event.as_str())
            }
            // No filterable conditions for the remaining variants.
            _ => false,
        }
    }

    fn block_in_range(&self, number: u64) -> bool {
        if self.from_block != 0 && number < self.from_block {
            return false;
        }
        if self.to_block != 0 && number > self.to_block {
            return false;
        }
        true
    }

    fn value_in_range(&self, value: Option<U256>) -> bool {
        if self.min_value.is_none() && self.max_value.is_none() {
            return true;
        }
        let Some(value) = value else {
            return false;
        };
        if let Some(min) = self.min_value {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max_value {
            if value > max {
                return false;
            }
        }
        true
    }

    fn topics_match(&self, topics: &[Hash]) -> bool {
        for (i, group) in self.topics.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            match topics.get(i) {
                Some(topic) if group.contains(topic) => {}
                _ => return false,
            }
        }
        true
    }

    fn event_type_allowed(&self, name: &str) -> bool {
        let Some(Value::Array(allowed)) = self.custom_data.get(CUSTOM_EVENT_TYPES_KEY) else {
            return true;
        };
        allowed.iter().any(|v| v.as_str() == Some(name))
    }
}
