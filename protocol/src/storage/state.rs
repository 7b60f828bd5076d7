//! # The State Store
//!
//! One shared, centrally-owned set of tables holding every entity on the
//! network: airlines, flights, insurance policies, passenger credits, plus
//! the operational flag, the owner identity, the authorized-caller set and
//! the custody pool balance.
//!
//! This module stores; it does not decide. Preconditions (who may sponsor,
//! how many votes admit an airline, what a premium may be) are enforced one
//! crate up, in `skybond-contracts`. What the store *does* guarantee:
//!
//! - All mutations are applied through a `&mut` borrow — one writer at a
//!   time, total ordering, no partial visibility. Callers that need
//!   cross-thread sharing wrap the state in a lock.
//! - All monetary arithmetic is checked. An overflowing credit or an
//!   over-drawn pool is a typed error, never a wrap-around.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::flight::{FlightKey, FlightStatus};
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the store's checked-arithmetic primitives.
#[derive(Debug, Error)]
pub enum StateError {
    /// Crediting a passenger would overflow their balance.
    ///
    /// If you're hitting this, someone is trying to credit more than
    /// 18.4 quintillion plumes. That's either a bug or an attack.
    #[error("credit overflow for {passenger}: current {current}, credit {credit}")]
    CreditOverflow {
        /// The passenger being credited.
        passenger: Address,
        /// Their balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },

    /// A deposit would overflow the custody pool.
    #[error("pool overflow: current {current}, deposit {deposit}")]
    PoolOverflow {
        /// Pool balance before the failed deposit.
        current: u64,
        /// The deposit that caused the overflow.
        deposit: u64,
    },

    /// A withdrawal exceeds what the pool actually holds.
    #[error("insufficient pool funds: requested {requested}, available {available}")]
    InsufficientPool {
        /// Amount requested for release.
        requested: u64,
        /// Amount the pool currently holds.
        available: u64,
    },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Admission state of an airline. One-way progression:
/// `PendingConsensus -> Registered -> Funded` (direct admission skips the
/// first stage). Absence from the airlines table means unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirlineStatus {
    /// Proposed, accumulating votes from the funded fleet.
    PendingConsensus,
    /// Admitted, but not yet a governance participant — funding required.
    Registered,
    /// Funded at or above the threshold. Full participant.
    Funded,
}

impl std::fmt::Display for AirlineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AirlineStatus::PendingConsensus => write!(f, "PendingConsensus"),
            AirlineStatus::Registered => write!(f, "Registered"),
            AirlineStatus::Funded => write!(f, "Funded"),
        }
    }
}

/// A participating (or aspiring) airline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    /// Current admission status.
    pub status: AirlineStatus,
    /// The funded airline (or, for the genesis airline, the owner) that
    /// first proposed this member.
    pub sponsor: Address,
    /// Identities that voted to admit this airline while it was pending.
    /// Retained after admission for audit.
    pub votes: BTreeSet<Address>,
    /// Total funding deposited, in plumes. Everything above the threshold
    /// is retained by the pool.
    pub funded_amount: u64,
    /// When the registration attempt was first recorded.
    pub registered_at: DateTime<Utc>,
    /// When the airline crossed the funding threshold, if it has.
    pub funded_at: Option<DateTime<Utc>>,
}

impl Airline {
    /// A directly-admitted airline (fleet still below the consensus size).
    pub fn registered(sponsor: Address) -> Self {
        Self {
            status: AirlineStatus::Registered,
            sponsor,
            votes: BTreeSet::new(),
            funded_amount: 0,
            registered_at: Utc::now(),
            funded_at: None,
        }
    }

    /// A candidate awaiting consensus. The sponsor's vote is implicit and
    /// recorded immediately.
    pub fn pending(sponsor: Address) -> Self {
        let mut votes = BTreeSet::new();
        votes.insert(sponsor);
        Self {
            status: AirlineStatus::PendingConsensus,
            sponsor,
            votes,
            funded_amount: 0,
            registered_at: Utc::now(),
            funded_at: None,
        }
    }

    /// `true` once the airline may sponsor, vote, and schedule flights.
    pub fn is_funded(&self) -> bool {
        self.status == AirlineStatus::Funded
    }
}

/// A registered flight, insurable until the oracle resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// The operating airline.
    pub airline: Address,
    /// Carrier flight code, e.g. `"SB1309"`.
    pub code: String,
    /// Scheduled departure, unix seconds.
    pub departure: i64,
    /// Oracle-resolved status. `Unknown` until resolution; mutated
    /// meaningfully exactly once.
    pub status: FlightStatus,
    /// When the flight was registered.
    pub registered_at: DateTime<Utc>,
}

impl Flight {
    /// A freshly registered, unresolved flight.
    pub fn new(airline: Address, code: impl Into<String>, departure: i64) -> Self {
        Self {
            airline,
            code: code.into(),
            departure,
            status: FlightStatus::Unknown,
            registered_at: Utc::now(),
        }
    }
}

/// An insurance policy binding a passenger's premium to one flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// The insured passenger.
    pub passenger: Address,
    /// Premium paid, in plumes. Fixed at purchase, capped by protocol.
    pub premium: u64,
    /// Whether the 1.5× credit has been issued. One-way false→true.
    pub credited: bool,
    /// When the policy was purchased.
    pub purchased_at: DateTime<Utc>,
}

impl Policy {
    /// A freshly purchased, uncredited policy.
    pub fn new(passenger: Address, premium: u64) -> Self {
        Self {
            passenger,
            premium,
            credited: false,
            purchased_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SuretyState
// ---------------------------------------------------------------------------

/// The complete network state.
///
/// Policies are stored per flight in a `BTreeMap` keyed by passenger so that
/// the crediting sweep iterates in a deterministic order — every node
/// replaying the same operations lands on byte-identical state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuretyState {
    /// The contract owner — the only identity that may pause the system or
    /// edit the caller allow-list.
    owner: Address,
    /// Global kill switch. While `false`, every mutating operation except
    /// the one restoring the flag is rejected.
    operational: bool,
    /// Services permitted to deliver oracle resolutions.
    authorized_callers: BTreeSet<Address>,
    /// Airlines table.
    airlines: HashMap<Address, Airline>,
    /// Flights table.
    flights: HashMap<FlightKey, Flight>,
    /// Policies, keyed (flight, passenger).
    policies: HashMap<FlightKey, BTreeMap<Address, Policy>>,
    /// Passenger credit balances, in plumes.
    credits: HashMap<Address, u64>,
    /// Funds held in custody: airline funding plus premiums, minus payouts.
    pool_balance: u64,
}

impl SuretyState {
    /// A fresh state: operational, no participants, empty pool.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            operational: true,
            authorized_callers: BTreeSet::new(),
            airlines: HashMap::new(),
            flights: HashMap::new(),
            policies: HashMap::new(),
            credits: HashMap::new(),
            pool_balance: 0,
        }
    }

    /// Rebuild a state from persisted parts. Only the storage layer calls
    /// this — everyone else goes through [`SuretyState::new`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        owner: Address,
        operational: bool,
        authorized_callers: BTreeSet<Address>,
        airlines: HashMap<Address, Airline>,
        flights: HashMap<FlightKey, Flight>,
        policies: HashMap<FlightKey, BTreeMap<Address, Policy>>,
        credits: HashMap<Address, u64>,
        pool_balance: u64,
    ) -> Self {
        Self {
            owner,
            operational,
            authorized_callers,
            airlines,
            flights,
            policies,
            credits,
            pool_balance,
        }
    }

    // -- Access scalars -----------------------------------------------------

    /// The contract owner.
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Whether mutating operations are currently enabled.
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Flip the operational flag. No-op-safe.
    pub fn set_operational(&mut self, flag: bool) {
        self.operational = flag;
    }

    /// Add an identity to the authorized-caller set. Idempotent.
    pub fn authorize_caller(&mut self, caller: Address) {
        self.authorized_callers.insert(caller);
    }

    /// Remove an identity from the authorized-caller set.
    /// Returns `true` if it was present.
    pub fn revoke_caller(&mut self, caller: &Address) -> bool {
        self.authorized_callers.remove(caller)
    }

    /// Whether `caller` may deliver oracle resolutions.
    pub fn is_authorized(&self, caller: &Address) -> bool {
        self.authorized_callers.contains(caller)
    }

    /// The current allow-list, in address order.
    pub fn authorized_callers(&self) -> impl Iterator<Item = &Address> {
        self.authorized_callers.iter()
    }

    // -- Airlines -----------------------------------------------------------

    /// Look up an airline record.
    pub fn airline(&self, address: &Address) -> Option<&Airline> {
        self.airlines.get(address)
    }

    /// Mutable lookup of an airline record.
    pub fn airline_mut(&mut self, address: &Address) -> Option<&mut Airline> {
        self.airlines.get_mut(address)
    }

    /// Insert or replace an airline record.
    pub fn insert_airline(&mut self, address: Address, airline: Airline) {
        self.airlines.insert(address, airline);
    }

    /// Whether any record (in any status) exists for the address.
    pub fn contains_airline(&self, address: &Address) -> bool {
        self.airlines.contains_key(address)
    }

    /// Number of airlines currently `Funded` — the governance electorate.
    pub fn funded_airline_count(&self) -> usize {
        self.airlines.values().filter(|a| a.is_funded()).count()
    }

    /// Total airline records, in any status.
    pub fn airline_count(&self) -> usize {
        self.airlines.len()
    }

    /// Iterate all airline records.
    pub fn airlines(&self) -> impl Iterator<Item = (&Address, &Airline)> {
        self.airlines.iter()
    }

    // -- Flights ------------------------------------------------------------

    /// Look up a flight by key.
    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// Mutable lookup of a flight.
    pub fn flight_mut(&mut self, key: &FlightKey) -> Option<&mut Flight> {
        self.flights.get_mut(key)
    }

    /// Insert or replace a flight record.
    pub fn insert_flight(&mut self, key: FlightKey, flight: Flight) {
        self.flights.insert(key, flight);
    }

    /// Whether a flight with this key exists.
    pub fn contains_flight(&self, key: &FlightKey) -> bool {
        self.flights.contains_key(key)
    }

    /// Total registered flights.
    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Iterate all flights.
    pub fn flights(&self) -> impl Iterator<Item = (&FlightKey, &Flight)> {
        self.flights.iter()
    }

    // -- Policies -----------------------------------------------------------

    /// Look up the policy a passenger holds on a flight.
    pub fn policy(&self, key: &FlightKey, passenger: &Address) -> Option<&Policy> {
        self.policies.get(key).and_then(|m| m.get(passenger))
    }

    /// Record a policy. The caller has already checked for duplicates.
    pub fn insert_policy(&mut self, key: FlightKey, policy: Policy) {
        self.policies
            .entry(key)
            .or_default()
            .insert(policy.passenger, policy);
    }

    /// Iterate the policies on a flight, in passenger-address order.
    pub fn policies_for_flight(&self, key: &FlightKey) -> impl Iterator<Item = &Policy> {
        self.policies.get(key).into_iter().flat_map(|m| m.values())
    }

    /// Mutably iterate the policies on a flight, in passenger-address order.
    pub fn policies_for_flight_mut(
        &mut self,
        key: &FlightKey,
    ) -> impl Iterator<Item = &mut Policy> {
        self.policies
            .get_mut(key)
            .into_iter()
            .flat_map(|m| m.values_mut())
    }

    /// Total policies across all flights.
    pub fn policy_count(&self) -> usize {
        self.policies.values().map(|m| m.len()).sum()
    }

    /// Iterate every policy with its flight key.
    pub fn policies(&self) -> impl Iterator<Item = (&FlightKey, &Policy)> {
        self.policies
            .iter()
            .flat_map(|(k, m)| m.values().map(move |p| (k, p)))
    }

    // -- Credits ------------------------------------------------------------

    /// A passenger's owed balance, in plumes. Zero if never credited.
    pub fn passenger_credit(&self, passenger: &Address) -> u64 {
        self.credits.get(passenger).copied().unwrap_or(0)
    }

    /// Raise a passenger's credit balance. Checked.
    pub fn add_credit(&mut self, passenger: Address, amount: u64) -> Result<u64, StateError> {
        let current = self.credits.get(&passenger).copied().unwrap_or(0);
        let updated = current
            .checked_add(amount)
            .ok_or(StateError::CreditOverflow {
                passenger,
                current,
                credit: amount,
            })?;
        self.credits.insert(passenger, updated);
        Ok(updated)
    }

    /// Zero a passenger's balance, returning what was owed. Used by the
    /// withdrawal path, which commits this removal *before* releasing funds.
    pub fn take_credit(&mut self, passenger: &Address) -> u64 {
        self.credits.remove(passenger).unwrap_or(0)
    }

    /// Restore a balance after a failed external release. Overwrites —
    /// the withdrawal path holds the only writer borrow, so nothing can
    /// have credited the passenger in between.
    pub fn restore_credit(&mut self, passenger: Address, amount: u64) {
        if amount > 0 {
            self.credits.insert(passenger, amount);
        }
    }

    /// Iterate every `(passenger, amount)` credit entry.
    pub fn credits(&self) -> impl Iterator<Item = (&Address, u64)> {
        self.credits.iter().map(|(a, c)| (a, *c))
    }

    /// Sum of every outstanding credit balance.
    pub fn total_outstanding_credit(&self) -> u64 {
        self.credits.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    // -- Pool ---------------------------------------------------------------

    /// Funds currently held in custody, in plumes.
    pub fn pool_balance(&self) -> u64 {
        self.pool_balance
    }

    /// Deposit into the pool (airline funding, premiums). Checked.
    pub fn deposit_pool(&mut self, amount: u64) -> Result<u64, StateError> {
        self.pool_balance =
            self.pool_balance
                .checked_add(amount)
                .ok_or(StateError::PoolOverflow {
                    current: self.pool_balance,
                    deposit: amount,
                })?;
        Ok(self.pool_balance)
    }

    /// Withdraw from the pool (payouts). Fails rather than underflows.
    pub fn withdraw_pool(&mut self, amount: u64) -> Result<u64, StateError> {
        self.pool_balance =
            self.pool_balance
                .checked_sub(amount)
                .ok_or(StateError::InsufficientPool {
                    requested: amount,
                    available: self.pool_balance,
                })?;
        Ok(self.pool_balance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn fresh() -> SuretyState {
        SuretyState::new(addr(0xFF))
    }

    #[test]
    fn new_state_is_operational_and_empty() {
        let state = fresh();
        assert!(state.is_operational());
        assert_eq!(state.airline_count(), 0);
        assert_eq!(state.flight_count(), 0);
        assert_eq!(state.policy_count(), 0);
        assert_eq!(state.pool_balance(), 0);
        assert_eq!(state.owner(), &addr(0xFF));
    }

    #[test]
    fn operational_flag_toggles() {
        let mut state = fresh();
        state.set_operational(false);
        assert!(!state.is_operational());
        state.set_operational(true);
        assert!(state.is_operational());
    }

    #[test]
    fn authorized_caller_set() {
        let mut state = fresh();
        assert!(!state.is_authorized(&addr(1)));
        state.authorize_caller(addr(1));
        assert!(state.is_authorized(&addr(1)));
        assert!(state.revoke_caller(&addr(1)));
        assert!(!state.is_authorized(&addr(1)));
        assert!(!state.revoke_caller(&addr(1)));
    }

    #[test]
    fn airline_insert_and_lookup() {
        let mut state = fresh();
        state.insert_airline(addr(1), Airline::registered(addr(0xFF)));
        assert!(state.contains_airline(&addr(1)));
        assert_eq!(
            state.airline(&addr(1)).unwrap().status,
            AirlineStatus::Registered
        );
        assert!(state.airline(&addr(2)).is_none());
    }

    #[test]
    fn funded_count_only_counts_funded() {
        let mut state = fresh();
        state.insert_airline(addr(1), Airline::registered(addr(0xFF)));
        state.insert_airline(addr(2), Airline::pending(addr(1)));
        assert_eq!(state.funded_airline_count(), 0);

        state.airline_mut(&addr(1)).unwrap().status = AirlineStatus::Funded;
        assert_eq!(state.funded_airline_count(), 1);
        assert_eq!(state.airline_count(), 2);
    }

    #[test]
    fn pending_airline_carries_sponsor_vote() {
        let airline = Airline::pending(addr(3));
        assert_eq!(airline.votes.len(), 1);
        assert!(airline.votes.contains(&addr(3)));
    }

    #[test]
    fn policy_storage_and_deterministic_order() {
        let mut state = fresh();
        let key = FlightKey::derive(&addr(1), "SB1", 1_900_000_000);
        state.insert_flight(key, Flight::new(addr(1), "SB1", 1_900_000_000));

        state.insert_policy(key, Policy::new(addr(30), 100));
        state.insert_policy(key, Policy::new(addr(10), 200));
        state.insert_policy(key, Policy::new(addr(20), 300));

        let passengers: Vec<Address> = state
            .policies_for_flight(&key)
            .map(|p| p.passenger)
            .collect();
        assert_eq!(passengers, vec![addr(10), addr(20), addr(30)]);
        assert_eq!(state.policy_count(), 3);
    }

    #[test]
    fn policy_lookup_by_flight_and_passenger() {
        let mut state = fresh();
        let key = FlightKey::derive(&addr(1), "SB1", 1_900_000_000);
        state.insert_policy(key, Policy::new(addr(7), 500));

        assert_eq!(state.policy(&key, &addr(7)).unwrap().premium, 500);
        assert!(state.policy(&key, &addr(8)).is_none());
    }

    #[test]
    fn credit_accumulates_checked() {
        let mut state = fresh();
        assert_eq!(state.add_credit(addr(5), 100).unwrap(), 100);
        assert_eq!(state.add_credit(addr(5), 50).unwrap(), 150);
        assert_eq!(state.passenger_credit(&addr(5)), 150);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut state = fresh();
        state.add_credit(addr(5), u64::MAX).unwrap();
        let err = state.add_credit(addr(5), 1).unwrap_err();
        assert!(matches!(err, StateError::CreditOverflow { .. }));
        // Balance unchanged by the failed credit.
        assert_eq!(state.passenger_credit(&addr(5)), u64::MAX);
    }

    #[test]
    fn take_credit_zeroes_balance() {
        let mut state = fresh();
        state.add_credit(addr(5), 150).unwrap();
        assert_eq!(state.take_credit(&addr(5)), 150);
        assert_eq!(state.passenger_credit(&addr(5)), 0);
        assert_eq!(state.take_credit(&addr(5)), 0);
    }

    #[test]
    fn restore_credit_after_failed_release() {
        let mut state = fresh();
        state.add_credit(addr(5), 150).unwrap();
        let owed = state.take_credit(&addr(5));
        state.restore_credit(addr(5), owed);
        assert_eq!(state.passenger_credit(&addr(5)), 150);
    }

    #[test]
    fn pool_deposit_and_withdraw() {
        let mut state = fresh();
        state.deposit_pool(1_000).unwrap();
        state.deposit_pool(500).unwrap();
        assert_eq!(state.pool_balance(), 1_500);

        state.withdraw_pool(600).unwrap();
        assert_eq!(state.pool_balance(), 900);
    }

    #[test]
    fn pool_overdraw_rejected() {
        let mut state = fresh();
        state.deposit_pool(100).unwrap();
        let err = state.withdraw_pool(101).unwrap_err();
        assert!(matches!(
            err,
            StateError::InsufficientPool {
                requested: 101,
                available: 100,
            }
        ));
        assert_eq!(state.pool_balance(), 100);
    }

    #[test]
    fn pool_overflow_rejected() {
        let mut state = fresh();
        state.deposit_pool(u64::MAX).unwrap();
        assert!(matches!(
            state.deposit_pool(1).unwrap_err(),
            StateError::PoolOverflow { .. }
        ));
    }

    #[test]
    fn state_serde_json_roundtrip() {
        let mut state = fresh();
        state.insert_airline(addr(1), Airline::registered(addr(0xFF)));
        let key = FlightKey::derive(&addr(1), "SB9", 1_900_000_000);
        state.insert_flight(key, Flight::new(addr(1), "SB9", 1_900_000_000));
        state.insert_policy(key, Policy::new(addr(7), 500));
        state.add_credit(addr(7), 750).unwrap();
        state.deposit_pool(10_000).unwrap();
        state.authorize_caller(addr(9));

        let json = serde_json::to_string(&state).unwrap();
        let recovered: SuretyState = serde_json::from_str(&json).unwrap();

        assert_eq!(recovered.owner(), state.owner());
        assert_eq!(recovered.airline_count(), 1);
        assert_eq!(recovered.policy(&key, &addr(7)).unwrap().premium, 500);
        assert_eq!(recovered.passenger_credit(&addr(7)), 750);
        assert_eq!(recovered.pool_balance(), 10_000);
        assert!(recovered.is_authorized(&addr(9)));
    }

    #[test]
    fn state_bincode_roundtrip() {
        let mut state = fresh();
        let key = FlightKey::derive(&addr(2), "SB2", 1_900_000_000);
        state.insert_flight(key, Flight::new(addr(2), "SB2", 1_900_000_000));
        state.deposit_pool(42).unwrap();

        let bytes = bincode::serialize(&state).unwrap();
        let recovered: SuretyState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(recovered.flight_count(), 1);
        assert_eq!(recovered.pool_balance(), 42);
    }
}
