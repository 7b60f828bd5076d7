//! # Key Management
//!
//! Ed25519 keypair generation and serialization for SkyBond identities.
//!
//! ## Why Ed25519?
//!
//! - Deterministic signatures (no k-value footguns like ECDSA).
//! - 128-bit security level in 32+32 bytes. Compact and sufficient.
//! - Constant-time implementations exist and are well-audited.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (thanks, ed25519-dalek).
//! - We use OS-level RNG (`OsRng`) for key generation. If your OS RNG is
//!   broken, you have bigger problems than flight insurance.
//! - Key bytes are never logged. If you add logging to this module, you
//!   will be asked to leave.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed — leaking details about
/// key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// A SkyBond identity keypair wrapping Ed25519 signing and verification keys.
///
/// Every address on the network traces back to one of these. The signing key
/// is the crown jewel — it authorizes airline governance actions, oracle
/// reports, and withdrawals.
///
/// ## Serialization
///
/// `Keypair` intentionally does NOT implement `Serialize`/`Deserialize`.
/// Serializing private keys should be a deliberate, conscious act, not
/// something that happens because someone shoved a keypair into a JSON
/// response. Use `secret_key_bytes()` / `from_bytes()` explicitly.
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of a SkyBond identity, safe to share with the world.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature over a message. Always exactly 64 bytes; anything
/// else simply fails verification — no panics, no undefined behavior.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Keypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Constructs a keypair deterministically from a 32-byte seed.
    ///
    /// **Warning**: a weak seed yields a weak key. Use a proper CSPRNG or
    /// KDF to produce the seed bytes. Handy for tests and key recovery.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Reconstruct a keypair from raw 32-byte secret key material.
    ///
    /// In Ed25519, the 32-byte secret key *is* the seed, so this is
    /// equivalent to [`from_seed`](Self::from_seed).
    pub fn from_bytes(secret_key_bytes: &[u8; SECRET_KEY_LENGTH]) -> Result<Self, KeyError> {
        Ok(Self::from_seed(secret_key_bytes))
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    ///
    /// Convenience for loading keys from the node's key file. Don't put raw
    /// hex keys in config files in production — but for devnet, we're not
    /// going to pretend you won't do it anyway.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let mut arr = [0u8; SECRET_KEY_LENGTH];
        arr.copy_from_slice(&bytes);
        Self::from_bytes(&arr)
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Raw secret key bytes. Handle with the respect 32 bytes of total
    /// account control deserve.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Sign a message. Ed25519 signatures are deterministic — the same
    /// (key, message) pair always produces the same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    /// Verify a signature made by this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl PublicKey {
    /// Construct from raw bytes, validating that they form a valid
    /// Ed25519 point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes: *bytes })
    }

    /// The raw 32 public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Hex encoding, mainly for logs and key files.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Verify a signature over `message`. Malformed keys or signatures
    /// verify as `false` rather than erroring — the caller only ever cares
    /// about the boolean.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        vk.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Signature {
    /// The raw signature bytes (64 for a well-formed signature).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex encoding for transport in JSON payloads.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}
