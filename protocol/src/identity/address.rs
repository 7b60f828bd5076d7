//! # SkyBond Addresses
//!
//! An [`Address`] is the network-facing identity of a participant. It is
//! derived from the participant's Ed25519 public key via BLAKE3 hashing and
//! Bech32 encoding:
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE3(public_key) -> 32 bytes
//!     -> Bech32("sky", hash) -> sky1qw508d6qe...
//! ```
//!
//! The `sky` human-readable prefix makes addresses immediately recognizable.
//! Bech32 provides built-in error detection — it can catch up to 4 character
//! errors — which matters when a passenger is copy-pasting the address their
//! payout goes to.
//!
//! ## Why BLAKE3 instead of the raw public key?
//!
//! - A layer of indirection (quantum resistance hedge).
//! - Consistent 32-byte output regardless of future key scheme changes.
//! - It's also what we key flights with, so the whole protocol hashes one way.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::keys::PublicKey;
use crate::config::ADDRESS_HRP;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an address string.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded data has an unexpected length.
    #[error("invalid address data length: expected {expected} bytes, got {got}")]
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A SkyBond address — the primary identity format used across the protocol.
///
/// Internally the BLAKE3 hash of the originating public key (32 bytes). The
/// Bech32 string form is computed on the fly.
///
/// # Examples
///
/// ```
/// use skybond_protocol::identity::{Address, Keypair};
///
/// let kp = Keypair::generate();
/// let addr = Address::from_public_key(&kp.public_key());
/// let encoded = addr.to_string();
/// assert!(encoded.starts_with("sky1"));
///
/// let recovered: Address = encoded.parse().unwrap();
/// assert_eq!(addr, recovered);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// BLAKE3 hash of the public key. This is what gets Bech32-encoded.
    key_hash: [u8; 32],
}

impl Address {
    /// Derive an address from a public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let key_hash = blake3::hash(pk.as_bytes());
        Self {
            key_hash: *key_hash.as_bytes(),
        }
    }

    /// Construct an address directly from a 32-byte hash.
    ///
    /// Used by the storage layer when rebuilding state from disk, and by
    /// tests that want deterministic throwaway identities.
    pub fn from_bytes(key_hash: [u8; 32]) -> Self {
        Self { key_hash }
    }

    /// The raw 32-byte hash underlying this address.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key_hash
    }

    /// Encode as a Bech32 string of the form `sky1…` with checksum.
    pub fn encode(&self) -> String {
        let hrp = Hrp::parse(ADDRESS_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.key_hash)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// Parse a Bech32-encoded address, validating HRP, checksum, and length.
    pub fn decode(addr: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        let expected_hrp = Hrp::parse(ADDRESS_HRP).expect("static HRP is valid");
        if hrp != expected_hrp {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        if data.len() != 32 {
            return Err(AddressError::InvalidDataLength {
                expected: 32,
                got: data.len(),
            });
        }

        let mut key_hash = [0u8; 32];
        key_hash.copy_from_slice(&data);
        Ok(Self { key_hash })
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.encode())
        } else {
            serializer.serialize_bytes(&self.key_hash)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::decode(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            if bytes.len() != 32 {
                return Err(serde::de::Error::custom(format!(
                    "expected 32-byte key hash, got {}",
                    bytes.len()
                )));
            }
            let mut key_hash = [0u8; 32];
            key_hash.copy_from_slice(&bytes);
            Ok(Address { key_hash })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn address_starts_with_sky1() {
        let kp = Keypair::generate();
        let addr = Address::from_public_key(&kp.public_key());
        let encoded = addr.encode();
        assert!(encoded.starts_with("sky1"), "address was: {}", encoded);
    }

    #[test]
    fn address_roundtrip() {
        let kp = Keypair::generate();
        let addr = Address::from_public_key(&kp.public_key());
        let recovered = Address::decode(&addr.encode()).unwrap();
        assert_eq!(addr, recovered);
    }

    #[test]
    fn different_keys_different_addresses() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let a1 = Address::from_public_key(&kp1.public_key());
        let a2 = Address::from_public_key(&kp2.public_key());
        assert_ne!(a1, a2);
    }

    #[test]
    fn deterministic_address_from_same_key() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let a1 = Address::from_public_key(&kp.public_key());
        let a2 = Address::from_public_key(&kp.public_key());
        assert_eq!(a1, a2);
    }

    #[test]
    fn invalid_hrp_rejected() {
        let hrp = Hrp::parse("btc").unwrap();
        let encoded = bech32::encode::<Bech32>(hrp, &[0u8; 32]).unwrap();
        let err = Address::decode(&encoded).unwrap_err();
        assert!(matches!(err, AddressError::InvalidHrp { .. }));
    }

    #[test]
    fn corrupted_address_rejected() {
        let kp = Keypair::generate();
        let mut addr = Address::from_public_key(&kp.public_key()).encode();
        // Corrupt a character in the middle of the data part.
        let mid = addr.len() / 2;
        let original = addr.as_bytes()[mid];
        let replacement = if original == b'q' { b'p' } else { b'q' };
        unsafe {
            addr.as_bytes_mut()[mid] = replacement;
        }
        assert!(Address::decode(&addr).is_err());
    }

    #[test]
    fn serde_json_roundtrip() {
        let kp = Keypair::generate();
        let addr = Address::from_public_key(&kp.public_key());
        let json = serde_json::to_string(&addr).unwrap();
        let recovered: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, recovered);
    }

    #[test]
    fn bincode_roundtrip() {
        let addr = Address::from_bytes([0xAB; 32]);
        let bytes = bincode::serialize(&addr).unwrap();
        let recovered: Address = bincode::deserialize(&bytes).unwrap();
        assert_eq!(addr, recovered);
    }

    #[test]
    fn ordering_is_stable() {
        // BTreeSet/BTreeMap iteration over addresses must be deterministic.
        let a = Address::from_bytes([1u8; 32]);
        let b = Address::from_bytes([2u8; 32]);
        assert!(a < b);
    }
}
