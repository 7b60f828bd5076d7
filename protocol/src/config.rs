//! # Protocol Configuration & Constants
//!
//! Every magic number in SkyBond lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define the economics of the network. Changing the funding
//! threshold or the payout ratio after launch is somewhere between
//! "difficult" and "career-ending", so choose wisely during devnet.

// ---------------------------------------------------------------------------
// Denomination
// ---------------------------------------------------------------------------

/// Number of decimal places in the SKY currency. 8 decimals, same as
/// Bitcoin. We're not reinventing this wheel.
pub const SKY_DECIMALS: u8 = 8;

/// One whole SKY expressed in plumes (the smallest unit — every network
/// needs a cute name for its smallest denomination, and ours is feathers).
pub const PLUMES_PER_SKY: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Governance Parameters
// ---------------------------------------------------------------------------

/// Minimum funding an airline must deposit before it may participate in
/// governance — sponsor new members, vote, or schedule insured flights.
/// 10 SKY. Skin in the game, priced so a real carrier doesn't blink and
/// a sybil does.
pub const AIRLINE_FUNDING_MIN: u64 = 10 * PLUMES_PER_SKY;

/// Number of funded airlines below which a single funded sponsor can admit
/// a new member directly. From the fifth airline onward, admission requires
/// a strict majority vote of the funded fleet.
pub const CONSENSUS_FREE_AIRLINES: usize = 4;

// ---------------------------------------------------------------------------
// Escrow Parameters
// ---------------------------------------------------------------------------

/// Maximum premium a passenger may pay for a single policy. 1 SKY.
/// Caps the pool's per-policy liability at 1.5 SKY.
pub const PREMIUM_CAP: u64 = PLUMES_PER_SKY;

/// Payout ratio numerator: a delayed passenger is credited
/// `premium * 3 / 2` — i.e. 1.5× what they paid.
pub const PAYOUT_NUMERATOR: u64 = 3;

/// Payout ratio denominator. Keep in sync with [`PAYOUT_NUMERATOR`] or
/// face the wrath of integration tests.
pub const PAYOUT_DENOMINATOR: u64 = 2;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Human-readable prefix for all SkyBond addresses (Bech32 HRP).
/// Short enough to type, long enough to be unambiguous.
pub const ADDRESS_HRP: &str = "sky";

/// Default REST/WebSocket API port.
pub const DEFAULT_RPC_PORT: u16 = 9850;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9851;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Total votes (the sponsor's implicit vote included) required to admit a
/// new airline when `funded` airlines are currently funded.
///
/// Strictly more than half: `funded / 2 + 1`. With 4 funded airlines that
/// is 3 votes; with 5 it is also 3; with 6 it is 4.
pub fn consensus_threshold(funded: usize) -> usize {
    funded / 2 + 1
}

/// The credit owed for a policy with the given premium: 1.5× the premium.
///
/// Returns `None` on overflow — unreachable for premiums within
/// [`PREMIUM_CAP`], but the caller should not have to trust that.
pub fn payout_for(premium: u64) -> Option<u64> {
    premium
        .checked_mul(PAYOUT_NUMERATOR)
        .map(|raised| raised / PAYOUT_DENOMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denomination_consistency() {
        assert_eq!(PLUMES_PER_SKY, 10u64.pow(SKY_DECIMALS as u32));
    }

    #[test]
    fn test_funding_threshold_is_ten_sky() {
        assert_eq!(AIRLINE_FUNDING_MIN, 10 * PLUMES_PER_SKY);
        // The cap must be well below the funding threshold, or a single
        // policy could out-weigh an airline's stake.
        assert!(PREMIUM_CAP < AIRLINE_FUNDING_MIN);
    }

    #[test]
    fn test_consensus_threshold_is_strict_majority() {
        assert_eq!(consensus_threshold(4), 3);
        assert_eq!(consensus_threshold(5), 3);
        assert_eq!(consensus_threshold(6), 4);
        assert_eq!(consensus_threshold(10), 6);
        // Threshold always exceeds half the electorate.
        for funded in 1..50 {
            assert!(consensus_threshold(funded) * 2 > funded);
        }
    }

    #[test]
    fn test_payout_is_one_point_five_x() {
        assert_eq!(payout_for(PLUMES_PER_SKY), Some(PLUMES_PER_SKY * 3 / 2));
        assert_eq!(payout_for(2), Some(3));
        assert_eq!(payout_for(0), Some(0));
    }

    #[test]
    fn test_payout_overflow_detected() {
        assert_eq!(payout_for(u64::MAX), None);
    }

    #[test]
    fn test_payout_at_cap_fits_in_u64() {
        // The maximum single-policy payout must be representable.
        assert!(payout_for(PREMIUM_CAP).is_some());
    }
}
