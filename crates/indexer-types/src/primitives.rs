//! # Chain Primitives
//!
//! Fixed-size hashes, addresses, and big integers used throughout the
//! indexer. These are re-exports of `primitive-types` with the aliases the
//! rest of the workspace speaks in.

pub use primitive_types::{H160, H256, U256};

/// A 20-byte account or contract address.
pub type Address = H160;

/// A 32-byte hash (block hash, transaction hash, log topic).
pub type Hash = H256;

/// Render an address as a `0x`-prefixed lowercase hex string.
#[must_use]
pub fn address_hex(addr: &Address) -> String {
    format!("{addr:#x}")
}

/// Render a hash as a `0x`-prefixed lowercase hex string.
#[must_use]
pub fn hash_hex(hash: &Hash) -> String {
    format!("{hash:#x}")
}

/// Parse a `0x`-prefixed (or bare) hex string into an address.
///
/// Returns `None` when the input is not exactly 20 bytes of hex.
#[must_use]
pub fn parse_address(s: &str) -> Option<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(Address::from_slice(&bytes))
}

/// Parse a `0x`-prefixed (or bare) hex string into a 32-byte hash.
#[must_use]
pub fn parse_hash(s: &str) -> Option<Hash> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(Hash::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::repeat_byte(0xab);
        let hex = address_hex(&addr);
        assert!(hex.starts_with("0x"));
        assert_eq!(parse_address(&hex), Some(addr));
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = Hash::repeat_byte(0x7f);
        let hex = hash_hex(&hash);
        assert_eq!(hex.len(), 66);
        assert_eq!(parse_hash(&hex), Some(hash));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(parse_address("0xabcd").is_none());
        assert!(parse_hash("0x00").is_none());
        assert!(parse_address("not hex").is_none());
    }
}
