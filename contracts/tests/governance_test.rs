//! Integration tests for operational settings and airline admission.
//!
//! These tests exercise the full governance lifecycle across module
//! boundaries: pausing and resuming, the funded-sponsor rule, direct
//! registration during bootstrap, and multiparty consensus for the fifth
//! and subsequent airlines.

use skybond_contracts::pool::AccessError;
use skybond_contracts::{GovernanceError, SuretyPool};
use skybond_protocol::config::AIRLINE_FUNDING_MIN;
use skybond_protocol::identity::Address;

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 32])
}

const OWNER: u8 = 0xFF;

fn new_pool() -> SuretyPool {
    SuretyPool::new(addr(OWNER), addr(1))
}

// ---------------------------------------------------------------------------
// Operations and Settings
// ---------------------------------------------------------------------------

#[test]
fn has_correct_initial_operational_value() {
    let pool = new_pool();
    assert!(pool.is_operational());
}

#[test]
fn blocks_set_operating_status_for_non_owner() {
    let mut pool = new_pool();
    let err = pool.set_operating_status(false, &addr(2)).unwrap_err();
    assert!(matches!(err, AccessError::NotOwner { .. }));
    assert!(pool.is_operational());
}

#[test]
fn allows_set_operating_status_for_owner() {
    let mut pool = new_pool();
    pool.set_operating_status(false, &addr(OWNER)).unwrap();
    assert!(!pool.is_operational());
}

#[test]
fn blocks_mutating_operations_while_paused() {
    let mut pool = new_pool();
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();
    pool.set_operating_status(false, &addr(OWNER)).unwrap();

    let err = pool.register_airline(addr(2), &addr(1)).unwrap_err();
    assert!(matches!(err, GovernanceError::Access(AccessError::Paused)));

    // Set it back and the same operation goes through.
    pool.set_operating_status(true, &addr(OWNER)).unwrap();
    pool.register_airline(addr(2), &addr(1)).unwrap();
}

// ---------------------------------------------------------------------------
// Airline Admission
// ---------------------------------------------------------------------------

#[test]
fn cannot_register_airline_if_sponsor_not_funded() {
    let mut pool = new_pool();

    let result = pool.register_airline(addr(2), &addr(1));

    assert!(result.is_err());
    assert!(
        !pool.is_airline_registered(&addr(2)),
        "airline should not be registered by a sponsor that hasn't provided funding"
    );
}

#[test]
fn can_register_airline_once_sponsor_funded() {
    let mut pool = new_pool();
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();

    pool.register_airline(addr(2), &addr(1)).unwrap();

    assert!(pool.is_airline_registered(&addr(2)));
}

#[test]
fn registered_airline_cannot_participate_until_funded() {
    let mut pool = new_pool();
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(2), &addr(1)).unwrap();

    assert!(pool.is_airline_registered(&addr(2)));
    assert!(
        !pool.is_airline_funded(&addr(2)),
        "airline should not participate until it submits the funding threshold"
    );

    // Sponsoring while unfunded fails.
    let err = pool.register_airline(addr(3), &addr(2)).unwrap_err();
    assert!(matches!(err, GovernanceError::NotFunded { .. }));

    // After funding, it can sponsor.
    pool.fund_airline(&addr(2), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(3), &addr(2)).unwrap();
}

#[test]
fn requires_multiparty_consensus_for_fifth_airline() {
    let mut pool = new_pool();

    // Fund and register the first four airlines.
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(2), &addr(1)).unwrap();
    pool.fund_airline(&addr(2), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(3), &addr(2)).unwrap();
    pool.fund_airline(&addr(3), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(4), &addr(3)).unwrap();
    pool.fund_airline(&addr(4), AIRLINE_FUNDING_MIN).unwrap();
    assert_eq!(pool.funded_airline_count(), 4);

    // Register the fifth airline under multiparty consensus.
    pool.register_airline(addr(5), &addr(4)).unwrap();
    assert!(!pool.is_airline_registered(&addr(5)));

    // One of the two outstanding votes cast — still pending.
    pool.vote_to_register_airline(&addr(5), &addr(1)).unwrap();
    assert!(!pool.is_airline_registered(&addr(5)));

    pool.vote_to_register_airline(&addr(5), &addr(2)).unwrap();
    assert!(
        pool.is_airline_registered(&addr(5)),
        "fifth airline should be registered with multiparty consensus"
    );
}

#[test]
fn end_to_end_registered_but_unfunded_cannot_sponsor() {
    // Airline A funds the threshold, registers B directly; B is registered
    // but not funded, so B sponsoring C fails.
    let mut pool = new_pool();
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();

    pool.register_airline(addr(2), &addr(1)).unwrap();
    assert!(pool.is_airline_registered(&addr(2)));
    assert!(!pool.is_airline_funded(&addr(2)));

    let err = pool.register_airline(addr(3), &addr(2)).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::NotFunded { airline } if airline == addr(2)
    ));
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn pool_serialization_roundtrip_preserves_governance_state() {
    let mut pool = new_pool();
    pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();
    pool.register_airline(addr(2), &addr(1)).unwrap();

    let json = serde_json::to_string(&pool).unwrap();
    let restored: SuretyPool = serde_json::from_str(&json).unwrap();

    assert!(restored.is_airline_funded(&addr(1)));
    assert!(restored.is_airline_registered(&addr(2)));
    assert!(!restored.is_airline_funded(&addr(2)));
    assert_eq!(restored.funded_airline_count(), 1);
    assert_eq!(restored.state().pool_balance(), AIRLINE_FUNDING_MIN);
}
