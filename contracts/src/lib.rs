//! # SkyBond Contracts
//!
//! The business rules of the SkyBond network. These contracts implement the
//! two engines that make SkyBond more than a fancy spreadsheet:
//!
//! - **Governance** — airline admission under multiparty consensus: direct
//!   registration while the funded fleet is small, strict-majority voting
//!   from the fifth member onward, and a hard funding threshold before any
//!   airline gets a say.
//! - **Escrow** — flight registration, capped insurance purchase,
//!   oracle-triggered 1.5× crediting, and passenger withdrawal with
//!   commit-before-release semantics.
//!
//! Both engines operate through [`SuretyPool`], a facade over the shared
//! state store, and both sit behind the access gate: an owner identity that
//! can pause the system, and an allow-list of services trusted to deliver
//! oracle resolutions.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Every operation validates all preconditions before mutating anything.
//!    A failed operation leaves no partial state behind.
//! 4. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod escrow;
pub mod governance;
pub mod pool;

pub use escrow::{EscrowError, FundsRelease, ReleaseError};
pub use governance::GovernanceError;
pub use pool::{AccessError, SuretyPool};
