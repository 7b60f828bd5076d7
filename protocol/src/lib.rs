// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SkyBond Protocol — Core Library
//!
//! This is the foundation of SkyBond: a decentralized flight-delay insurance
//! network where airlines govern their own membership and passengers get paid
//! automatically when an airline delays their flight.
//!
//! SkyBond takes a pragmatic stance: Ed25519 for participant identities
//! (because we're not barbarians), BLAKE3 for addresses and flight keys
//! (fast, boring, correct), and plain `u64` plume amounts with checked
//! arithmetic everywhere (wrapping arithmetic and money do not mix).
//!
//! ## Architecture
//!
//! The library is split into modules that mirror the actual concerns of an
//! insurance settlement network:
//!
//! - **config** — Protocol constants and network parameters.
//! - **identity** — Ed25519 keypairs and Bech32 `sky1…` addresses.
//! - **flight** — Flight keys and the oracle's resolved status codes.
//! - **storage** — The shared state store and its sled persistence layer.
//!
//! The business rules — airline admission, policy escrow, crediting,
//! withdrawal — live one crate up in `skybond-contracts`, built on the
//! primitives exported here.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. The state store stores; it does not decide. Policy lives in contracts.
//! 3. Every public API is documented. Internal shame is documented too.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod flight;
pub mod identity;
pub mod storage;
