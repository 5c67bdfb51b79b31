//! Shared builders for integration tests.

use indexer_bus::events::{BlockEvent, TransactionEvent};
use indexer_bus::ChainEvent;
use indexer_types::primitives::{Address, Hash, U256};

/// A block event with a hash derived from its number.
pub fn block_event(number: u64) -> ChainEvent {
    BlockEvent::new(number, Hash::repeat_byte((number % 251) as u8), 5).into()
}

/// A transfer between two addresses at a block height.
pub fn transfer(from: Address, to: Address, value: u64, block: u64) -> ChainEvent {
    TransactionEvent::new(
        Hash::repeat_byte((value % 251) as u8),
        block,
        Hash::repeat_byte((block % 251) as u8),
        0,
        from,
        Some(to),
        U256::from(value),
    )
    .into()
}

/// Address `a1` used across the filter scenarios.
pub fn addr_a1() -> Address {
    Address::repeat_byte(0xa1)
}

/// Address `a2` used across the filter scenarios.
pub fn addr_a2() -> Address {
    Address::repeat_byte(0xa2)
}
