//! # Decoded Value Model
//!
//! Typed values produced by contract log decoding. A decoded log becomes a
//! `name -> DecodedValue` map; the variants cover the ABI types the
//! system-contract decoders emit.

use crate::primitives::{Address, Hash, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodedValue {
    /// A 20-byte address.
    Address(Address),
    /// A 32-byte hash. Indexed dynamic ABI types decode to the topic hash.
    Hash(Hash),
    /// An unsigned 256-bit integer.
    Uint(U256),
    /// A signed integer decoded from a signed ABI type.
    Int(i64),
    /// A boolean flag.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A UTF-8 string.
    Str(String),
    /// An ordered list of decoded values.
    List(Vec<DecodedValue>),
}

/// The decoded field map of a parsed log.
pub type DecodedFields = HashMap<String, DecodedValue>;

impl DecodedValue {
    /// The contained address, when this is an `Address` value.
    #[must_use]
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// The contained integer, when this is a `Uint` value.
    #[must_use]
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The contained signed integer, when this is an `Int` value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The contained flag, when this is a `Bool` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The contained string, when this is a `Str` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "{a:#x}"),
            Self::Hash(h) => write!(f, "{h:#x}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
