//! # Raw Chain Records
//!
//! The chain-shaped records the RPC fetchers hand to the indexer pipeline.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `TransactionRecord`, `Receipt`
//! - **Logs**: `Log` (the raw receipt log record)
//! - **References**: `BlockRef` (the lightweight number+hash pair events
//!   carry instead of a full block)

use crate::primitives::{Address, Hash, U256};
use serde::{Deserialize, Serialize};

/// A lightweight reference to a block: number plus hash.
///
/// Events carry this instead of a full [`Block`] so they stay cheap to
/// clone and serialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block height.
    pub number: u64,
    /// Block hash.
    pub hash: Hash,
}

impl BlockRef {
    /// Create a reference from a number and hash.
    #[must_use]
    pub fn new(number: u64, hash: Hash) -> Self {
        Self { number, hash }
    }
}

/// A fetched block with its transaction hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub number: u64,
    /// Block hash.
    pub hash: Hash,
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Unix timestamp when the block was proposed.
    pub timestamp: u64,
    /// Gas used by all transactions in the block.
    pub gas_used: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Hashes of the transactions included in the block.
    pub transactions: Vec<Hash>,
}

impl Block {
    /// Lightweight reference to this block.
    #[must_use]
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.number, self.hash)
    }
}

/// A fetched transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash.
    pub hash: Hash,
    /// Number of the block this transaction was included in.
    pub block_number: u64,
    /// Hash of the block this transaction was included in.
    pub block_hash: Hash,
    /// Index of the transaction within the block.
    pub index: u32,
    /// Sender address.
    pub from: Address,
    /// Recipient address. `None` means contract creation.
    pub to: Option<Address>,
    /// Transferred value in base units.
    pub value: U256,
    /// Transaction payload.
    pub input: Vec<u8>,
    /// Sender's nonce.
    pub nonce: u64,
}

/// A transaction receipt with its logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: Hash,
    /// Execution status: `true` when the transaction succeeded.
    pub status: bool,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
}

/// A raw log record as it appears in a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log.
    pub address: Address,
    /// Indexed topics. At most four entries; `topics[0]` is the event
    /// signature hash for non-anonymous events.
    pub topics: Vec<Hash>,
    /// ABI-encoded non-indexed data.
    pub data: Vec<u8>,
    /// Number of the block containing the log.
    pub block_number: u64,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: Hash,
    /// Index of the transaction within its block.
    pub tx_index: u32,
    /// Index of the log within the block.
    pub log_index: u32,
    /// Set when the log was removed by a chain reorganization.
    pub removed: bool,
}

impl Log {
    /// The event signature topic, when present.
    #[must_use]
    pub fn signature_topic(&self) -> Option<Hash> {
        self.topics.first().copied()
    }
}
