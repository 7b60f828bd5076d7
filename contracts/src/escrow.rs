//! # Escrow — Policies, Crediting, Withdrawal
//!
//! The escrow engine holds the passenger side of SkyBond. A funded airline
//! registers a flight; passengers buy capped policies against it; when the
//! oracle resolves the flight as delayed by the airline's own fault, every
//! open policy is credited 1.5× its premium; passengers withdraw their
//! credit through the treasury seam.
//!
//! ## The one rule that matters
//!
//! In [`SuretyPool::pay`], the credit balance and the custody pool are
//! debited **before** the external funds release is attempted, and a failed
//! release rolls both back. Commit internal effects first, then touch the
//! outside world — the ordering that makes re-triggering a payout on an
//! already-cleared balance impossible.
//!
//! ## Idempotent resolution
//!
//! The oracle delivers exactly one meaningful status per flight. A second
//! resolution attempt returns [`EscrowError::AlreadyProcessed`] and mutates
//! nothing. An `Unknown` report means the oracle has no consensus yet; it
//! leaves the flight open rather than burning the once-only resolution.

use thiserror::Error;

use skybond_protocol::config::{payout_for, PREMIUM_CAP};
use skybond_protocol::flight::{FlightKey, FlightStatus};
use skybond_protocol::identity::Address;
use skybond_protocol::storage::{Flight, Policy};

use crate::pool::{AccessError, SuretyPool};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The external funds release was rejected or failed.
#[derive(Debug, Error)]
#[error("funds release failed: {0}")]
pub struct ReleaseError(pub String);

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The access gate rejected the operation.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// No airline record exists for the flight operator.
    #[error("unknown airline {airline}")]
    AirlineNotFound {
        /// The address that was looked up.
        airline: Address,
    },

    /// The operating airline has not funded and may not schedule flights.
    #[error("airline {airline} is not funded")]
    AirlineNotFunded {
        /// The unfunded airline.
        airline: Address,
    },

    /// A flight with the same (airline, code, departure) already exists.
    #[error("flight {key} is already registered")]
    DuplicateFlight {
        /// The colliding flight key.
        key: FlightKey,
    },

    /// No flight exists for the given key.
    #[error("flight {key} not found")]
    FlightNotFound {
        /// The key that was looked up.
        key: FlightKey,
    },

    /// A policy premium must be positive.
    #[error("premium must be greater than zero")]
    ZeroPremium,

    /// The premium exceeds the protocol cap.
    #[error("premium {paid} exceeds cap {cap}")]
    PremiumExceedsCap {
        /// Plumes offered.
        paid: u64,
        /// The protocol cap.
        cap: u64,
    },

    /// The passenger already holds a policy on this flight. Policies are
    /// rejected rather than merged.
    #[error("passenger {passenger} already holds a policy on flight {key}")]
    DuplicatePolicy {
        /// The flight in question.
        key: FlightKey,
        /// The passenger with the existing policy.
        passenger: Address,
    },

    /// The flight was already resolved; the resolution is applied at most
    /// meaningfully once.
    #[error("flight {key} already processed as {status}")]
    AlreadyProcessed {
        /// The flight in question.
        key: FlightKey,
        /// The status it already carries.
        status: FlightStatus,
    },

    /// The passenger has no credit to withdraw.
    #[error("no credit owed to {passenger}")]
    NoCredit {
        /// The passenger with the empty balance.
        passenger: Address,
    },

    /// The custody pool does not hold enough to cover the withdrawal.
    #[error("pool depleted: requested {requested}, available {available}")]
    PoolDepleted {
        /// Plumes requested.
        requested: u64,
        /// Plumes the pool holds.
        available: u64,
    },

    /// An arithmetic overflow would occur. With 64-bit plume amounts this
    /// is a bug or an attack, never normal operation.
    #[error("amount overflow: operation would exceed allowed limits")]
    AmountOverflow,

    /// The external funds release failed; the withdrawal was rolled back.
    #[error(transparent)]
    Release(#[from] ReleaseError),
}

// ---------------------------------------------------------------------------
// FundsRelease
// ---------------------------------------------------------------------------

/// The seam between the escrow engine and whatever actually moves money.
///
/// [`SuretyPool::pay`] commits the internal debit first and only then calls
/// [`release`](FundsRelease::release); an `Err` rolls the debit back. An
/// implementation must therefore be atomic from the engine's point of view:
/// either the funds verifiably left, or they verifiably did not.
///
/// The node wires a receipt-journal treasury here; tests use a recording
/// fake that can be told to fail.
pub trait FundsRelease {
    /// Release `amount` plumes to `passenger`.
    fn release(&mut self, passenger: &Address, amount: u64) -> Result<(), ReleaseError>;
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl SuretyPool {
    /// Register a flight operated by a funded airline.
    ///
    /// Returns the derived [`FlightKey`] under which policies are sold.
    ///
    /// # Errors
    ///
    /// [`EscrowError::AirlineNotFound`] / [`EscrowError::AirlineNotFunded`]
    /// if the operator is missing or unfunded.
    /// [`EscrowError::DuplicateFlight`] if the key already exists.
    pub fn register_flight(
        &mut self,
        airline: &Address,
        code: &str,
        departure: i64,
    ) -> Result<FlightKey, EscrowError> {
        self.require_operational()?;

        let record = self
            .state()
            .airline(airline)
            .ok_or(EscrowError::AirlineNotFound { airline: *airline })?;
        if !record.is_funded() {
            return Err(EscrowError::AirlineNotFunded { airline: *airline });
        }

        let key = FlightKey::derive(airline, code, departure);
        if self.state().contains_flight(&key) {
            return Err(EscrowError::DuplicateFlight { key });
        }

        self.state_mut()
            .insert_flight(key, Flight::new(*airline, code, departure));
        tracing::info!(%key, %airline, code, departure, "flight registered");
        Ok(key)
    }

    /// Buy insurance on a registered flight.
    ///
    /// The premium moves into the custody pool and the policy is recorded
    /// uncredited. One policy per (flight, passenger); a second purchase is
    /// rejected, not merged.
    ///
    /// # Errors
    ///
    /// [`EscrowError::FlightNotFound`], [`EscrowError::ZeroPremium`],
    /// [`EscrowError::PremiumExceedsCap`], [`EscrowError::DuplicatePolicy`].
    pub fn buy_insurance(
        &mut self,
        key: &FlightKey,
        passenger: Address,
        amount: u64,
    ) -> Result<(), EscrowError> {
        self.require_operational()?;

        if !self.state().contains_flight(key) {
            return Err(EscrowError::FlightNotFound { key: *key });
        }
        if amount == 0 {
            return Err(EscrowError::ZeroPremium);
        }
        if amount > PREMIUM_CAP {
            return Err(EscrowError::PremiumExceedsCap {
                paid: amount,
                cap: PREMIUM_CAP,
            });
        }
        if self.state().policy(key, &passenger).is_some() {
            return Err(EscrowError::DuplicatePolicy {
                key: *key,
                passenger,
            });
        }

        self.state_mut()
            .deposit_pool(amount)
            .map_err(|_| EscrowError::AmountOverflow)?;
        self.state_mut()
            .insert_policy(*key, Policy::new(passenger, amount));
        tracing::info!(%key, %passenger, premium = amount, "policy sold");
        Ok(())
    }

    /// Apply the oracle's resolved status to a flight.
    ///
    /// Authorized-caller only — this is the oracle-resolution path. The
    /// first resolved status wins; later attempts fail with
    /// [`EscrowError::AlreadyProcessed`] and mutate nothing. An `Unknown`
    /// report is a no-op: the oracle has no verdict yet.
    ///
    /// When the status is an airline-fault delay, every uncredited policy on
    /// the flight is credited exactly 1.5× its premium, once. All payouts
    /// are computed and overflow-checked before any balance changes.
    pub fn process_flight_status(
        &mut self,
        key: &FlightKey,
        status: FlightStatus,
        caller: &Address,
    ) -> Result<(), EscrowError> {
        self.require_operational()?;
        self.require_authorized(caller)?;

        let flight = self
            .state()
            .flight(key)
            .ok_or(EscrowError::FlightNotFound { key: *key })?;
        if flight.status.is_resolved() {
            return Err(EscrowError::AlreadyProcessed {
                key: *key,
                status: flight.status,
            });
        }
        if !status.is_resolved() {
            tracing::debug!(%key, "oracle reported no consensus; flight left open");
            return Ok(());
        }

        // Compute every payout up front so the crediting sweep below cannot
        // fail halfway through.
        let mut payouts: Vec<(Address, u64)> = Vec::new();
        if status.is_airline_fault() {
            for policy in self.state().policies_for_flight(key) {
                if policy.credited {
                    continue;
                }
                let payout = payout_for(policy.premium).ok_or(EscrowError::AmountOverflow)?;
                let current = self.state().passenger_credit(&policy.passenger);
                if current.checked_add(payout).is_none() {
                    return Err(EscrowError::AmountOverflow);
                }
                payouts.push((policy.passenger, payout));
            }
        }

        let flight = self
            .state_mut()
            .flight_mut(key)
            .expect("flight checked above");
        flight.status = status;

        for policy in self.state_mut().policies_for_flight_mut(key) {
            if !policy.credited && status.is_airline_fault() {
                policy.credited = true;
            }
        }
        for (passenger, payout) in &payouts {
            self.state_mut()
                .add_credit(*passenger, *payout)
                .map_err(|_| EscrowError::AmountOverflow)?;
        }

        tracing::info!(
            %key,
            %status,
            credited_policies = payouts.len(),
            "flight status processed"
        );
        Ok(())
    }

    /// Withdraw a passenger's full credit balance.
    ///
    /// The balance and the custody pool are debited first; only then is the
    /// external release attempted through `treasury`. A failed release
    /// restores both, so the withdrawal either happens completely or not at
    /// all. Returns the amount released.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NoCredit`] on a zero balance (withdrawing nothing is
    /// an error, not a no-op). [`EscrowError::PoolDepleted`] if custody
    /// cannot cover the credit. [`EscrowError::Release`] if the external
    /// release failed (state rolled back).
    pub fn pay(
        &mut self,
        passenger: &Address,
        treasury: &mut dyn FundsRelease,
    ) -> Result<u64, EscrowError> {
        self.require_operational()?;

        let owed = self.state().passenger_credit(passenger);
        if owed == 0 {
            return Err(EscrowError::NoCredit {
                passenger: *passenger,
            });
        }
        let available = self.state().pool_balance();
        if available < owed {
            return Err(EscrowError::PoolDepleted {
                requested: owed,
                available,
            });
        }

        // Commit the internal debit before touching the outside world.
        let owed = self.state_mut().take_credit(passenger);
        if self.state_mut().withdraw_pool(owed).is_err() {
            self.state_mut().restore_credit(*passenger, owed);
            return Err(EscrowError::AmountOverflow);
        }

        if let Err(release_err) = treasury.release(passenger, owed) {
            // Roll back: the funds never left.
            self.state_mut().restore_credit(*passenger, owed);
            self.state_mut()
                .deposit_pool(owed)
                .map_err(|_| EscrowError::AmountOverflow)?;
            tracing::warn!(%passenger, owed, error = %release_err, "funds release failed, withdrawal rolled back");
            return Err(release_err.into());
        }

        tracing::info!(%passenger, amount = owed, "credit withdrawn");
        Ok(owed)
    }

    // -- Read helpers -------------------------------------------------------

    /// Look up a flight.
    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.state().flight(key)
    }

    /// Look up the policy a passenger holds on a flight.
    pub fn policy(&self, key: &FlightKey, passenger: &Address) -> Option<&Policy> {
        self.state().policy(key, passenger)
    }

    /// A passenger's withdrawable credit, in plumes.
    pub fn passenger_credit(&self, passenger: &Address) -> u64 {
        self.state().passenger_credit(passenger)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
