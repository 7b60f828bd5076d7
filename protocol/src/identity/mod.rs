//! # Identity — Keys and Addresses
//!
//! Every SkyBond participant — airline, passenger, oracle service, contract
//! owner — is an Ed25519 keypair. The network-facing identity is the
//! [`Address`]: a Bech32-encoded BLAKE3 hash of the public key.

pub mod address;
pub mod keys;

pub use address::{Address, AddressError};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
