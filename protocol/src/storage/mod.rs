//! # Storage — State Store and Persistence
//!
//! Two layers, cleanly separated:
//!
//! - [`state`] — the in-memory state store: every table the network needs
//!   (airlines, flights, policies, credits) plus the operational scalars.
//!   Pure storage with lookup and atomic update primitives; business rules
//!   live in `skybond-contracts`.
//! - [`db`] — sled-backed persistence for the state store and the payout
//!   receipt journal.

pub mod db;
pub mod state;

pub use db::{DbError, DbResult, PayoutReceipt, SuretyDb};
pub use state::{Airline, AirlineStatus, Flight, Policy, StateError, SuretyState};
