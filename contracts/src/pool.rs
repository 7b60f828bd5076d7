//! # SuretyPool — The Contract Facade and Access Gate
//!
//! [`SuretyPool`] owns the shared state store and is the single entry point
//! for every operation on the network. The governance and escrow engines are
//! implemented as `impl SuretyPool` blocks in their own modules; this module
//! holds construction and the access gate.
//!
//! ## The access gate
//!
//! Three checks stand in front of the engines:
//!
//! - **Operational flag** — a global kill switch. While paused, every
//!   mutating operation fails with [`AccessError::Paused`] except
//!   [`SuretyPool::set_operating_status`] itself, which must stay reachable
//!   or the system could never be un-paused.
//! - **Owner** — only the contract owner may flip the flag or edit the
//!   caller allow-list.
//! - **Allow-list** — oracle resolutions are accepted only from identities
//!   the owner has explicitly authorized.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skybond_protocol::identity::Address;
use skybond_protocol::storage::{Airline, SuretyState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures at the access gate, shared by every operation.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The operation is owner-only and the caller is not the owner.
    #[error("caller {caller} is not the contract owner")]
    NotOwner {
        /// The identity that attempted the operation.
        caller: Address,
    },

    /// The system is paused; mutating operations are disabled.
    #[error("system is not operational")]
    Paused,

    /// The caller is not on the authorized-caller allow-list.
    #[error("caller {caller} is not authorized")]
    UnauthorizedCaller {
        /// The identity that attempted the operation.
        caller: Address,
    },
}

// ---------------------------------------------------------------------------
// SuretyPool
// ---------------------------------------------------------------------------

/// The SkyBond insurance pool: airline governance, policy escrow, and the
/// access gate in front of both.
///
/// Holds the authoritative [`SuretyState`]. All mutations go through `&mut
/// self`, which gives a single total order of operations — callers that
/// share the pool across threads wrap it in a lock and the lock *is* the
/// serialization discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuretyPool {
    state: SuretyState,
}

impl SuretyPool {
    /// Create a new pool with its genesis airline.
    ///
    /// The first airline cannot satisfy the usual "sponsor must be funded"
    /// rule — there is nobody to sponsor it — so it is admitted directly at
    /// construction, sponsored by the owner. It still has to fund itself
    /// before it can participate.
    pub fn new(owner: Address, first_airline: Address) -> Self {
        let mut state = SuretyState::new(owner);
        state.insert_airline(first_airline, Airline::registered(owner));
        tracing::info!(%owner, %first_airline, "surety pool created");
        Self { state }
    }

    /// Wrap a previously persisted state.
    pub fn from_state(state: SuretyState) -> Self {
        Self { state }
    }

    /// Read access to the underlying state.
    pub fn state(&self) -> &SuretyState {
        &self.state
    }

    /// Consume the pool, yielding the state for persistence.
    pub fn into_state(self) -> SuretyState {
        self.state
    }

    // -- Access gate operations ---------------------------------------------

    /// Whether mutating operations are currently enabled.
    pub fn is_operational(&self) -> bool {
        self.state.is_operational()
    }

    /// Pause or resume the system. Owner-only.
    ///
    /// Deliberately *not* gated on the operational flag — this is the one
    /// operation that must work while paused. Setting the current value
    /// again is a harmless no-op.
    pub fn set_operating_status(&mut self, flag: bool, caller: &Address) -> Result<(), AccessError> {
        self.require_owner(caller)?;
        if self.state.is_operational() != flag {
            self.state.set_operational(flag);
            tracing::warn!(operational = flag, "operating status changed");
        }
        Ok(())
    }

    /// Add `identity` to the oracle-resolution allow-list. Owner-only.
    pub fn authorize_caller(
        &mut self,
        identity: Address,
        caller: &Address,
    ) -> Result<(), AccessError> {
        self.require_operational()?;
        self.require_owner(caller)?;
        self.state.authorize_caller(identity);
        tracing::info!(%identity, "caller authorized");
        Ok(())
    }

    /// Remove `identity` from the allow-list. Owner-only. Removing an
    /// identity that was never authorized is a no-op.
    pub fn deauthorize_caller(
        &mut self,
        identity: &Address,
        caller: &Address,
    ) -> Result<(), AccessError> {
        self.require_operational()?;
        self.require_owner(caller)?;
        if self.state.revoke_caller(identity) {
            tracing::info!(%identity, "caller deauthorized");
        }
        Ok(())
    }

    // -- Guards used by the engines -----------------------------------------

    pub(crate) fn require_operational(&self) -> Result<(), AccessError> {
        if self.state.is_operational() {
            Ok(())
        } else {
            Err(AccessError::Paused)
        }
    }

    pub(crate) fn require_owner(&self, caller: &Address) -> Result<(), AccessError> {
        if self.state.owner() == caller {
            Ok(())
        } else {
            Err(AccessError::NotOwner { caller: *caller })
        }
    }

    pub(crate) fn require_authorized(&self, caller: &Address) -> Result<(), AccessError> {
        if self.state.is_authorized(caller) {
            Ok(())
        } else {
            Err(AccessError::UnauthorizedCaller { caller: *caller })
        }
    }

    pub(crate) fn state_mut(&mut self) -> &mut SuretyState {
        &mut self.state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
