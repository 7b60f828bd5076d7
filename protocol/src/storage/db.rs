//! # SuretyDb — Persistent Storage Engine
//!
//! The persistence layer for the SkyBond network state, built on sled's
//! embedded key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB or tables in SQL). Each table of the state store gets its own
//! tree:
//!
//! | Tree       | Key                              | Value                  |
//! |------------|----------------------------------|------------------------|
//! | `airlines` | address hash (32B)               | `bincode(Airline)`     |
//! | `flights`  | flight key (32B)                 | `bincode(Flight)`      |
//! | `policies` | flight key ‖ passenger (64B)     | `bincode(Policy)`      |
//! | `credits`  | address hash (32B)               | amount (8B BE)         |
//! | `payouts`  | receipt UUID (16B)               | `bincode(PayoutReceipt)` |
//! | `metadata` | key (UTF-8)                      | value (bytes)          |
//!
//! ## Snapshot model
//!
//! The node holds the authoritative [`SuretyState`] in memory and calls
//! [`SuretyDb::persist_state`] after every successful mutation. Each tree is
//! rewritten with a single atomic `Batch` and the whole snapshot is flushed
//! before the call returns — a crash leaves either the previous snapshot or
//! the new one, never a half-written mix within a tree.
//!
//! Payout receipts are the one append-only journal: they record money that
//! left the pool and are never rewritten by snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, Tree};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use uuid::Uuid;

use super::state::{Airline, Flight, Policy, SuretyState};
use crate::flight::FlightKey;
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Owner address (32 raw bytes).
const META_OWNER: &[u8] = b"owner";
/// Operational flag (single byte, 0 or 1).
const META_OPERATIONAL: &[u8] = b"operational";
/// Authorized-caller set (`bincode(Vec<Address>)`).
const META_AUTHORIZED: &[u8] = b"authorized_callers";
/// Pool balance (8 bytes BE).
const META_POOL_BALANCE: &[u8] = b"pool_balance";

// ---------------------------------------------------------------------------
// PayoutReceipt
// ---------------------------------------------------------------------------

/// A durable record of funds released to a passenger.
///
/// Written by the node's treasury when a withdrawal commits. This is the
/// audit trail an operator reaches for when a passenger claims they were
/// never paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Unique receipt identifier.
    pub id: Uuid,
    /// The passenger the funds were released to.
    pub passenger: Address,
    /// Amount released, in plumes.
    pub amount: u64,
    /// When the release was recorded.
    pub released_at: DateTime<Utc>,
}

impl PayoutReceipt {
    /// A fresh receipt for a release happening now.
    pub fn new(passenger: Address, amount: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            passenger,
            amount,
            released_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SuretyDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for the SkyBond state.
///
/// Wraps a sled `Db` and exposes typed accessors for each table plus the
/// snapshot save/load used by the node. All serialization uses bincode for
/// compactness and speed.
///
/// # Thread Safety
///
/// sled is inherently thread-safe — trees support lock-free concurrent reads
/// and serialized writes. `SuretyDb` can be shared via `Arc<SuretyDb>`
/// without external synchronization.
#[derive(Debug, Clone)]
pub struct SuretyDb {
    /// The underlying sled database handle.
    db: Db,
    /// Airline records keyed by address hash.
    airlines: Tree,
    /// Flight records keyed by flight key.
    flights: Tree,
    /// Policies keyed by flight key ‖ passenger hash.
    policies: Tree,
    /// Credit balances keyed by address hash.
    credits: Tree,
    /// Append-only payout receipt journal.
    payouts: Tree,
    /// Scalars: owner, operational flag, allow-list, pool balance.
    metadata: Tree,
}

impl SuretyDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database cleaned up on drop.
    ///
    /// Ideal for unit tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let airlines = db.open_tree("airlines")?;
        let flights = db.open_tree("flights")?;
        let policies = db.open_tree("policies")?;
        let credits = db.open_tree("credits")?;
        let payouts = db.open_tree("payouts")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            airlines,
            flights,
            policies,
            credits,
            payouts,
            metadata,
        })
    }

    // -- Snapshot -----------------------------------------------------------

    /// Persist a full snapshot of the state.
    ///
    /// Each tree is cleared and rewritten with one atomic batch, then the
    /// database is flushed so the snapshot is durable when this returns.
    pub fn persist_state(&self, state: &SuretyState) -> DbResult<()> {
        let mut airline_batch = Batch::default();
        for (address, airline) in state.airlines() {
            let bytes = bincode::serialize(airline)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            airline_batch.insert(address.as_bytes(), bytes);
        }
        self.airlines.clear()?;
        self.airlines.apply_batch(airline_batch)?;

        let mut flight_batch = Batch::default();
        for (key, flight) in state.flights() {
            let bytes =
                bincode::serialize(flight).map_err(|e| DbError::Serialization(e.to_string()))?;
            flight_batch.insert(key.as_bytes(), bytes);
        }
        self.flights.clear()?;
        self.flights.apply_batch(flight_batch)?;

        let mut policy_batch = Batch::default();
        for (key, policy) in state.policies() {
            let bytes =
                bincode::serialize(policy).map_err(|e| DbError::Serialization(e.to_string()))?;
            policy_batch.insert(policy_key(key, &policy.passenger).as_slice(), bytes);
        }
        self.policies.clear()?;
        self.policies.apply_batch(policy_batch)?;

        let mut credit_batch = Batch::default();
        for (passenger, amount) in state.credits() {
            credit_batch.insert(passenger.as_bytes(), &amount.to_be_bytes());
        }
        self.credits.clear()?;
        self.credits.apply_batch(credit_batch)?;

        let callers: Vec<Address> = state.authorized_callers().copied().collect();
        let callers_bytes =
            bincode::serialize(&callers).map_err(|e| DbError::Serialization(e.to_string()))?;

        let mut meta_batch = Batch::default();
        meta_batch.insert(META_OWNER, state.owner().as_bytes().as_slice());
        meta_batch.insert(
            META_OPERATIONAL,
            &[if state.is_operational() { 1u8 } else { 0u8 }],
        );
        meta_batch.insert(META_AUTHORIZED, callers_bytes);
        meta_batch.insert(META_POOL_BALANCE, &state.pool_balance().to_be_bytes());
        self.metadata.apply_batch(meta_batch)?;

        self.db.flush()?;
        tracing::debug!(
            airlines = state.airline_count(),
            flights = state.flight_count(),
            policies = state.policy_count(),
            pool = state.pool_balance(),
            "state snapshot persisted"
        );
        Ok(())
    }

    /// Load the persisted snapshot, if one exists.
    ///
    /// Returns `Ok(None)` on a fresh database (no owner recorded).
    pub fn load_state(&self) -> DbResult<Option<SuretyState>> {
        let Some(owner_bytes) = self.metadata.get(META_OWNER)? else {
            return Ok(None);
        };
        let owner = Address::from_bytes(read_hash32(&owner_bytes, "owner address")?);

        let operational = match self.metadata.get(META_OPERATIONAL)? {
            Some(bytes) => bytes.first().copied().unwrap_or(1) == 1,
            None => true,
        };

        let authorized: BTreeSet<Address> = match self.metadata.get(META_AUTHORIZED)? {
            Some(bytes) => {
                let callers: Vec<Address> = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                callers.into_iter().collect()
            }
            None => BTreeSet::new(),
        };

        let pool_balance = match self.metadata.get(META_POOL_BALANCE)? {
            Some(bytes) => u64::from_be_bytes(
                bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Corrupt("pool balance bytes".into()))?,
            ),
            None => 0,
        };

        let mut airlines = HashMap::new();
        for entry in self.airlines.iter() {
            let (key, value) = entry?;
            let address = Address::from_bytes(read_hash32(&key, "airline address")?);
            let airline: Airline = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            airlines.insert(address, airline);
        }

        let mut flights = HashMap::new();
        for entry in self.flights.iter() {
            let (key, value) = entry?;
            let flight_key = FlightKey::from_bytes(read_hash32(&key, "flight key")?);
            let flight: Flight = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            flights.insert(flight_key, flight);
        }

        let mut policies: HashMap<FlightKey, BTreeMap<Address, Policy>> = HashMap::new();
        for entry in self.policies.iter() {
            let (key, value) = entry?;
            if key.len() != 64 {
                return Err(DbError::Corrupt(format!(
                    "policy key length {}, expected 64",
                    key.len()
                )));
            }
            let flight_key = FlightKey::from_bytes(read_hash32(&key[..32], "policy flight key")?);
            let policy: Policy = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            policies
                .entry(flight_key)
                .or_default()
                .insert(policy.passenger, policy);
        }

        let mut credits = HashMap::new();
        for entry in self.credits.iter() {
            let (key, value) = entry?;
            let passenger = Address::from_bytes(read_hash32(&key, "credit address")?);
            let amount = u64::from_be_bytes(
                value
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Corrupt("credit amount bytes".into()))?,
            );
            credits.insert(passenger, amount);
        }

        Ok(Some(SuretyState::from_parts(
            owner,
            operational,
            authorized,
            airlines,
            flights,
            policies,
            credits,
            pool_balance,
        )))
    }

    // -- Payout journal -----------------------------------------------------

    /// Append a payout receipt to the journal.
    pub fn record_payout(&self, receipt: &PayoutReceipt) -> DbResult<()> {
        let bytes =
            bincode::serialize(receipt).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.payouts.insert(receipt.id.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// All recorded payout receipts, in no particular order.
    pub fn payouts(&self) -> DbResult<Vec<PayoutReceipt>> {
        let mut receipts = Vec::new();
        for entry in self.payouts.iter() {
            let (_key, value) = entry?;
            let receipt: PayoutReceipt = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// Number of payout receipts on record.
    pub fn payout_count(&self) -> usize {
        self.payouts.len()
    }

    // -- Utility ------------------------------------------------------------

    /// Number of persisted airline records.
    pub fn airline_count(&self) -> usize {
        self.airlines.len()
    }

    /// Number of persisted flight records.
    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Number of persisted policies.
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Composite key for the policies tree: flight key (32B) ‖ passenger (32B).
fn policy_key(flight: &FlightKey, passenger: &Address) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(flight.as_bytes());
    key[32..].copy_from_slice(passenger.as_bytes());
    key
}

/// Read exactly 32 bytes out of a stored key or value.
fn read_hash32(bytes: &[u8], what: &str) -> DbResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Corrupt(format!("{what}: expected 32 bytes, got {}", bytes.len())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::state::{Airline, AirlineStatus, Flight, Policy};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn populated_state() -> (SuretyState, FlightKey) {
        let mut state = SuretyState::new(addr(0xFF));
        let mut first = Airline::registered(addr(0xFF));
        first.status = AirlineStatus::Funded;
        first.funded_amount = 1_000_000_000;
        state.insert_airline(addr(1), first);
        state.insert_airline(addr(2), Airline::pending(addr(1)));

        let key = FlightKey::derive(&addr(1), "SB1309", 1_900_000_000);
        state.insert_flight(key, Flight::new(addr(1), "SB1309", 1_900_000_000));
        state.insert_policy(key, Policy::new(addr(7), 100_000_000));
        state.add_credit(addr(7), 150_000_000).unwrap();
        state.deposit_pool(1_100_000_000).unwrap();
        state.authorize_caller(addr(9));
        (state, key)
    }

    #[test]
    fn open_temporary_database() {
        let db = SuretyDb::open_temporary().expect("should create temp db");
        assert_eq!(db.airline_count(), 0);
        assert_eq!(db.flight_count(), 0);
        assert_eq!(db.policy_count(), 0);
        assert_eq!(db.payout_count(), 0);
    }

    #[test]
    fn open_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SuretyDb::open(dir.path()).expect("should open db");
        assert_eq!(db.airline_count(), 0);
        drop(db);

        // Re-open to verify the persistence path works.
        let db2 = SuretyDb::open(dir.path()).expect("should reopen db");
        assert_eq!(db2.airline_count(), 0);
    }

    #[test]
    fn fresh_database_has_no_state() {
        let db = SuretyDb::open_temporary().unwrap();
        assert!(db.load_state().unwrap().is_none());
    }

    #[test]
    fn snapshot_roundtrip() {
        let db = SuretyDb::open_temporary().unwrap();
        let (state, key) = populated_state();

        db.persist_state(&state).unwrap();
        let loaded = db.load_state().unwrap().expect("snapshot should exist");

        assert_eq!(loaded.owner(), state.owner());
        assert!(loaded.is_operational());
        assert!(loaded.is_authorized(&addr(9)));
        assert_eq!(loaded.airline_count(), 2);
        assert_eq!(loaded.funded_airline_count(), 1);
        assert_eq!(
            loaded.airline(&addr(2)).unwrap().status,
            AirlineStatus::PendingConsensus
        );
        assert_eq!(loaded.flight(&key).unwrap().code, "SB1309");
        assert_eq!(loaded.policy(&key, &addr(7)).unwrap().premium, 100_000_000);
        assert_eq!(loaded.passenger_credit(&addr(7)), 150_000_000);
        assert_eq!(loaded.pool_balance(), 1_100_000_000);
    }

    #[test]
    fn snapshot_overwrites_previous() {
        let db = SuretyDb::open_temporary().unwrap();
        let (mut state, _key) = populated_state();
        db.persist_state(&state).unwrap();

        // Mutate and persist again: the old credit entry must be gone.
        state.take_credit(&addr(7));
        state.set_operational(false);
        db.persist_state(&state).unwrap();

        let loaded = db.load_state().unwrap().unwrap();
        assert_eq!(loaded.passenger_credit(&addr(7)), 0);
        assert!(!loaded.is_operational());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, key) = populated_state();
        {
            let db = SuretyDb::open(dir.path()).unwrap();
            db.persist_state(&state).unwrap();
        }

        let db = SuretyDb::open(dir.path()).unwrap();
        let loaded = db.load_state().unwrap().expect("snapshot should persist");
        assert_eq!(loaded.flight(&key).unwrap().airline, addr(1));
        assert_eq!(loaded.policy_count(), 1);
    }

    #[test]
    fn payout_journal_appends() {
        let db = SuretyDb::open_temporary().unwrap();
        let r1 = PayoutReceipt::new(addr(7), 150_000_000);
        let r2 = PayoutReceipt::new(addr(8), 75_000_000);

        db.record_payout(&r1).unwrap();
        db.record_payout(&r2).unwrap();

        assert_eq!(db.payout_count(), 2);
        let receipts = db.payouts().unwrap();
        assert!(receipts.contains(&r1));
        assert!(receipts.contains(&r2));
    }

    #[test]
    fn payout_journal_survives_snapshot() {
        let db = SuretyDb::open_temporary().unwrap();
        let receipt = PayoutReceipt::new(addr(7), 150_000_000);
        db.record_payout(&receipt).unwrap();

        let (state, _) = populated_state();
        db.persist_state(&state).unwrap();

        // Snapshots rewrite the state tables, never the journal.
        assert_eq!(db.payout_count(), 1);
    }

    #[test]
    fn multiple_policies_same_flight_roundtrip() {
        let db = SuretyDb::open_temporary().unwrap();
        let mut state = SuretyState::new(addr(0xFF));
        let key = FlightKey::derive(&addr(1), "SB2", 1_900_000_000);
        state.insert_flight(key, Flight::new(addr(1), "SB2", 1_900_000_000));
        state.insert_policy(key, Policy::new(addr(10), 100));
        state.insert_policy(key, Policy::new(addr(11), 200));
        state.insert_policy(key, Policy::new(addr(12), 300));

        db.persist_state(&state).unwrap();
        let loaded = db.load_state().unwrap().unwrap();

        assert_eq!(loaded.policy_count(), 3);
        assert_eq!(loaded.policy(&key, &addr(11)).unwrap().premium, 200);
    }

    #[test]
    fn flush_does_not_error() {
        let db = SuretyDb::open_temporary().unwrap();
        db.flush().expect("flush should succeed");
    }
}
