//! # Indexer Types - Shared Chain Entities
//!
//! Core domain types shared by every indexer crate: chain primitives
//! (addresses, hashes, big integers), raw chain records (blocks,
//! transactions, receipts, logs), and the decoded-value model produced by
//! contract log parsers.
//!
//! Everything here is plain data. Behavior (filtering, routing, decoding)
//! lives in the crates that consume these types.

pub mod decoded;
pub mod entities;
pub mod primitives;

pub use decoded::DecodedValue;
pub use entities::{Block, BlockRef, Log, Receipt, TransactionRecord};
pub use primitives::{Address, Hash, U256};
