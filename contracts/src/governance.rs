//! # Governance — Airline Admission
//!
//! Airlines run the network, so airlines decide who joins it. The admission
//! workflow has two regimes:
//!
//! - **Bootstrap**: while fewer than four airlines are funded, any single
//!   funded airline can admit a new member directly. A young network needs
//!   growth more than it needs ceremony.
//! - **Consensus**: from then on, admission requires strictly more than half
//!   of the funded fleet. The sponsor's vote is counted implicitly when the
//!   candidate is proposed; the rest arrive through
//!   [`SuretyPool::vote_to_register_airline`].
//!
//! Registration alone buys nothing. An airline becomes a participant —
//! able to sponsor, vote, and schedule insured flights — only after
//! depositing the funding threshold. Skin in the game, first.
//!
//! The vote threshold is re-evaluated against the *current* funded count on
//! every vote: if the fleet grows mid-ballot, the bar rises with it.

use thiserror::Error;

use skybond_protocol::config::{consensus_threshold, AIRLINE_FUNDING_MIN, CONSENSUS_FREE_AIRLINES};
use skybond_protocol::identity::Address;
use skybond_protocol::storage::{Airline, AirlineStatus};

use crate::pool::{AccessError, SuretyPool};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during airline admission and funding.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// The access gate rejected the operation.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The sponsor or voter has not funded and therefore has no say.
    #[error("airline {airline} has not submitted funding and cannot participate")]
    NotFunded {
        /// The unfunded sponsor or voter.
        airline: Address,
    },

    /// A record already exists for the candidate (in any status).
    #[error("airline {airline} is already registered")]
    AlreadyRegistered {
        /// The duplicate candidate.
        airline: Address,
    },

    /// No record exists for the referenced airline.
    #[error("unknown airline {candidate}")]
    UnknownCandidate {
        /// The address that was looked up.
        candidate: Address,
    },

    /// The candidate is still gathering votes and cannot be funded yet.
    #[error("airline {candidate} is pending consensus: {votes} of {required} votes")]
    ConsensusPending {
        /// The pending candidate.
        candidate: Address,
        /// Votes cast so far (sponsor included).
        votes: usize,
        /// Votes currently required for admission.
        required: usize,
    },

    /// The airline has already crossed the funding threshold.
    #[error("airline {airline} is already funded")]
    AlreadyFunded {
        /// The airline that tried to fund twice.
        airline: Address,
    },

    /// The deposit is below the funding threshold.
    #[error("insufficient funding: provided {provided}, required {required}")]
    InsufficientFunding {
        /// Plumes offered.
        provided: u64,
        /// Plumes required.
        required: u64,
    },

    /// This voter has already voted for this candidate.
    #[error("{voter} has already voted for {candidate}")]
    DuplicateVote {
        /// The candidate being voted on.
        candidate: Address,
        /// The repeat voter.
        voter: Address,
    },

    /// An arithmetic overflow would occur. With 64-bit plume amounts this
    /// is a bug or an attack, never normal operation.
    #[error("amount overflow: operation would exceed allowed limits")]
    AmountOverflow,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl SuretyPool {
    /// Propose `candidate` for admission, sponsored by a funded airline.
    ///
    /// While fewer than [`CONSENSUS_FREE_AIRLINES`] airlines are funded, the
    /// candidate is admitted directly (status `Registered`). Otherwise the
    /// candidate enters `PendingConsensus` with the sponsor's implicit vote
    /// recorded.
    ///
    /// # Errors
    ///
    /// [`GovernanceError::NotFunded`] if the sponsor is not funded.
    /// [`GovernanceError::AlreadyRegistered`] if any record exists for the
    /// candidate.
    pub fn register_airline(
        &mut self,
        candidate: Address,
        sponsor: &Address,
    ) -> Result<(), GovernanceError> {
        self.require_operational()?;

        let sponsor_funded = self
            .state()
            .airline(sponsor)
            .map(Airline::is_funded)
            .unwrap_or(false);
        if !sponsor_funded {
            return Err(GovernanceError::NotFunded { airline: *sponsor });
        }

        if self.state().contains_airline(&candidate) {
            return Err(GovernanceError::AlreadyRegistered { airline: candidate });
        }

        let funded = self.state().funded_airline_count();
        if funded < CONSENSUS_FREE_AIRLINES {
            self.state_mut()
                .insert_airline(candidate, Airline::registered(*sponsor));
            tracing::info!(%candidate, %sponsor, "airline registered directly");
        } else {
            self.state_mut()
                .insert_airline(candidate, Airline::pending(*sponsor));
            tracing::info!(
                %candidate,
                %sponsor,
                required = consensus_threshold(funded),
                "airline pending multiparty consensus"
            );
        }
        Ok(())
    }

    /// Cast a vote to admit a pending candidate.
    ///
    /// When the vote count reaches a strict majority of the currently
    /// funded fleet, the candidate becomes `Registered`.
    ///
    /// # Errors
    ///
    /// [`GovernanceError::NotFunded`] if the voter is not funded.
    /// [`GovernanceError::UnknownCandidate`] if no record exists.
    /// [`GovernanceError::AlreadyRegistered`] if the candidate is past the
    /// voting stage.
    /// [`GovernanceError::DuplicateVote`] on a repeat vote.
    pub fn vote_to_register_airline(
        &mut self,
        candidate: &Address,
        voter: &Address,
    ) -> Result<(), GovernanceError> {
        self.require_operational()?;

        let voter_funded = self
            .state()
            .airline(voter)
            .map(Airline::is_funded)
            .unwrap_or(false);
        if !voter_funded {
            return Err(GovernanceError::NotFunded { airline: *voter });
        }

        let record = self
            .state()
            .airline(candidate)
            .ok_or(GovernanceError::UnknownCandidate {
                candidate: *candidate,
            })?;
        if record.status != AirlineStatus::PendingConsensus {
            return Err(GovernanceError::AlreadyRegistered { airline: *candidate });
        }
        if record.votes.contains(voter) {
            return Err(GovernanceError::DuplicateVote {
                candidate: *candidate,
                voter: *voter,
            });
        }

        let required = consensus_threshold(self.state().funded_airline_count());

        // All preconditions held; mutate.
        let record = self
            .state_mut()
            .airline_mut(candidate)
            .expect("candidate checked above");
        record.votes.insert(*voter);
        let votes = record.votes.len();

        if votes >= required {
            record.status = AirlineStatus::Registered;
            tracing::info!(%candidate, votes, required, "consensus reached, airline registered");
        } else {
            tracing::debug!(%candidate, votes, required, "vote recorded");
        }
        Ok(())
    }

    /// Deposit funding for a registered airline.
    ///
    /// The full amount goes into the custody pool — anything above the
    /// threshold is retained, not refunded. On success the airline becomes
    /// `Funded` and gains full governance rights.
    ///
    /// # Errors
    ///
    /// [`GovernanceError::UnknownCandidate`] if no record exists.
    /// [`GovernanceError::ConsensusPending`] if the candidate has not been
    /// admitted yet.
    /// [`GovernanceError::AlreadyFunded`] on a second funding attempt.
    /// [`GovernanceError::InsufficientFunding`] below the threshold.
    pub fn fund_airline(&mut self, airline: &Address, amount: u64) -> Result<(), GovernanceError> {
        self.require_operational()?;

        let record = self
            .state()
            .airline(airline)
            .ok_or(GovernanceError::UnknownCandidate {
                candidate: *airline,
            })?;
        match record.status {
            AirlineStatus::PendingConsensus => {
                return Err(GovernanceError::ConsensusPending {
                    candidate: *airline,
                    votes: record.votes.len(),
                    required: consensus_threshold(self.state().funded_airline_count()),
                });
            }
            AirlineStatus::Funded => {
                return Err(GovernanceError::AlreadyFunded { airline: *airline });
            }
            AirlineStatus::Registered => {}
        }

        if amount < AIRLINE_FUNDING_MIN {
            return Err(GovernanceError::InsufficientFunding {
                provided: amount,
                required: AIRLINE_FUNDING_MIN,
            });
        }

        self.state_mut()
            .deposit_pool(amount)
            .map_err(|_| GovernanceError::AmountOverflow)?;

        let record = self
            .state_mut()
            .airline_mut(airline)
            .expect("airline checked above");
        record.status = AirlineStatus::Funded;
        record.funded_amount = amount;
        record.funded_at = Some(chrono::Utc::now());

        tracing::info!(%airline, amount, "airline funded");
        Ok(())
    }

    // -- Read helpers -------------------------------------------------------

    /// `true` if the airline has been admitted (registered or funded).
    pub fn is_airline_registered(&self, airline: &Address) -> bool {
        self.state()
            .airline(airline)
            .map(|a| a.status != AirlineStatus::PendingConsensus)
            .unwrap_or(false)
    }

    /// `true` if the airline has crossed the funding threshold.
    pub fn is_airline_funded(&self, airline: &Address) -> bool {
        self.state()
            .airline(airline)
            .map(Airline::is_funded)
            .unwrap_or(false)
    }

    /// The size of the current governance electorate.
    pub fn funded_airline_count(&self) -> usize {
        self.state().funded_airline_count()
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

    const OWNER: u8 = 0xFF;

    /// A pool whose genesis airline (1) is already funded.
    fn bootstrapped() -> SuretyPool {
        let mut pool = SuretyPool::new(addr(OWNER), addr(1));
        pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap();
        pool
    }

    /// A pool with airlines 1..=4 funded — the consensus regime.
    fn four_funded() -> SuretyPool {
        let mut pool = bootstrapped();
        for n in 2..=4u8 {
            pool.register_airline(addr(n), &addr(n - 1)).unwrap();
            pool.fund_airline(&addr(n), AIRLINE_FUNDING_MIN).unwrap();
        }
        assert_eq!(pool.funded_airline_count(), 4);
        pool
    }

    #[test]
    fn unfunded_airline_cannot_sponsor() {
        let mut pool = SuretyPool::new(addr(OWNER), addr(1));
        let err = pool.register_airline(addr(2), &addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::NotFunded { .. }));
        assert!(!pool.is_airline_registered(&addr(2)));
    }

    #[test]
    fn funded_airline_registers_directly_below_consensus_size() {
        let mut pool = bootstrapped();
        pool.register_airline(addr(2), &addr(1)).unwrap();
        assert!(pool.is_airline_registered(&addr(2)));
        assert!(!pool.is_airline_funded(&addr(2)));
    }

    #[test]
    fn registered_but_unfunded_cannot_sponsor() {
        let mut pool = bootstrapped();
        pool.register_airline(addr(2), &addr(1)).unwrap();
        let err = pool.register_airline(addr(3), &addr(2)).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::NotFunded { airline } if airline == addr(2)
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut pool = bootstrapped();
        pool.register_airline(addr(2), &addr(1)).unwrap();
        let err = pool.register_airline(addr(2), &addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyRegistered { .. }));
    }

    #[test]
    fn fifth_airline_needs_consensus() {
        let mut pool = four_funded();
        pool.register_airline(addr(5), &addr(4)).unwrap();

        // Sponsor's implicit vote only — still pending.
        assert!(!pool.is_airline_registered(&addr(5)));

        // Second vote of three required — still pending.
        pool.vote_to_register_airline(&addr(5), &addr(1)).unwrap();
        assert!(!pool.is_airline_registered(&addr(5)));

        // Third vote crosses the strict majority of four.
        pool.vote_to_register_airline(&addr(5), &addr(2)).unwrap();
        assert!(pool.is_airline_registered(&addr(5)));
    }

    #[test]
    fn duplicate_vote_rejected() {
        let mut pool = four_funded();
        pool.register_airline(addr(5), &addr(4)).unwrap();

        // The sponsor's vote was implicit; voting again is a duplicate.
        let err = pool.vote_to_register_airline(&addr(5), &addr(4)).unwrap_err();
        assert!(matches!(err, GovernanceError::DuplicateVote { .. }));

        pool.vote_to_register_airline(&addr(5), &addr(1)).unwrap();
        let err = pool.vote_to_register_airline(&addr(5), &addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::DuplicateVote { .. }));
    }

    #[test]
    fn unfunded_voter_rejected() {
        let mut pool = four_funded();
        pool.register_airline(addr(5), &addr(4)).unwrap();

        // Address 7 has no record at all; address 5 is pending, not funded.
        let err = pool.vote_to_register_airline(&addr(5), &addr(7)).unwrap_err();
        assert!(matches!(err, GovernanceError::NotFunded { .. }));
        let err = pool.vote_to_register_airline(&addr(5), &addr(5)).unwrap_err();
        assert!(matches!(err, GovernanceError::NotFunded { .. }));
    }

    #[test]
    fn vote_for_unknown_candidate_rejected() {
        let mut pool = four_funded();
        let err = pool.vote_to_register_airline(&addr(9), &addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownCandidate { .. }));
    }

    #[test]
    fn vote_for_admitted_airline_rejected() {
        let mut pool = four_funded();
        let err = pool.vote_to_register_airline(&addr(3), &addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyRegistered { .. }));
    }

    #[test]
    fn funding_below_threshold_rejected() {
        let mut pool = bootstrapped();
        pool.register_airline(addr(2), &addr(1)).unwrap();
        let err = pool
            .fund_airline(&addr(2), AIRLINE_FUNDING_MIN - 1)
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InsufficientFunding { required, .. }
                if required == AIRLINE_FUNDING_MIN
        ));
        assert!(!pool.is_airline_funded(&addr(2)));
    }

    #[test]
    fn excess_funding_is_retained_by_pool() {
        let mut pool = bootstrapped();
        pool.register_airline(addr(2), &addr(1)).unwrap();
        let before = pool.state().pool_balance();
        pool.fund_airline(&addr(2), AIRLINE_FUNDING_MIN * 2).unwrap();

        assert_eq!(
            pool.state().pool_balance(),
            before + AIRLINE_FUNDING_MIN * 2
        );
        assert_eq!(
            pool.state().airline(&addr(2)).unwrap().funded_amount,
            AIRLINE_FUNDING_MIN * 2
        );
    }

    #[test]
    fn double_funding_rejected() {
        let mut pool = bootstrapped();
        let err = pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyFunded { .. }));
    }

    #[test]
    fn funding_pending_candidate_rejected() {
        let mut pool = four_funded();
        pool.register_airline(addr(5), &addr(4)).unwrap();
        let err = pool.fund_airline(&addr(5), AIRLINE_FUNDING_MIN).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::ConsensusPending {
                votes: 1,
                required: 3,
                ..
            }
        ));
    }

    #[test]
    fn funding_unknown_airline_rejected() {
        let mut pool = bootstrapped();
        let err = pool.fund_airline(&addr(9), AIRLINE_FUNDING_MIN).unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownCandidate { .. }));
    }

    #[test]
    fn paused_system_blocks_governance() {
        let mut pool = bootstrapped();
        pool.set_operating_status(false, &addr(OWNER)).unwrap();

        assert!(matches!(
            pool.register_airline(addr(2), &addr(1)).unwrap_err(),
            GovernanceError::Access(AccessError::Paused)
        ));
        assert!(matches!(
            pool.fund_airline(&addr(1), AIRLINE_FUNDING_MIN).unwrap_err(),
            GovernanceError::Access(AccessError::Paused)
        ));

        // Resume re-enables.
        pool.set_operating_status(true, &addr(OWNER)).unwrap();
        pool.register_airline(addr(2), &addr(1)).unwrap();
    }

    #[test]
    fn threshold_rises_with_fleet_growth() {
        // Six funded airlines: strict majority is four.
        let mut pool = four_funded();
        pool.register_airline(addr(5), &addr(4)).unwrap();
        pool.vote_to_register_airline(&addr(5), &addr(1)).unwrap();
        pool.vote_to_register_airline(&addr(5), &addr(2)).unwrap();
        pool.fund_airline(&addr(5), AIRLINE_FUNDING_MIN).unwrap();

        pool.register_airline(addr(6), &addr(5)).unwrap();
        pool.vote_to_register_airline(&addr(6), &addr(1)).unwrap();
        pool.vote_to_register_airline(&addr(6), &addr(2)).unwrap();
        assert!(pool.is_airline_registered(&addr(6)));
        pool.fund_airline(&addr(6), AIRLINE_FUNDING_MIN).unwrap();
        assert_eq!(pool.funded_airline_count(), 6);

        // Candidate seven: sponsor + two more votes is only three of the
        // four now required.
        pool.register_airline(addr(7), &addr(6)).unwrap();
        pool.vote_to_register_airline(&addr(7), &addr(1)).unwrap();
        pool.vote_to_register_airline(&addr(7), &addr(2)).unwrap();
        assert!(!pool.is_airline_registered(&addr(7)));

        pool.vote_to_register_airline(&addr(7), &addr(3)).unwrap();
        assert!(pool.is_airline_registered(&addr(7)));
    }
}
