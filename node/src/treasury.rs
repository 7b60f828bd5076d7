//! # Receipt Treasury
//!
//! The node's [`FundsRelease`] implementation. Withdrawals don't move real
//! money from inside this process — they hand the release to whatever
//! settlement rail the deployment wires up (bank transfer, on-chain
//! transfer, voucher issuance). What the node *does* own is the durable
//! record that a release was committed: a [`PayoutReceipt`] appended to the
//! sled journal.
//!
//! The escrow engine's contract is strict: by the time `release` returns
//! `Ok`, the payout must be durably committed, because the passenger's
//! credit is already zeroed. A failed journal write therefore returns `Err`,
//! which makes the engine roll the withdrawal back.

use std::sync::Arc;

use skybond_contracts::{FundsRelease, ReleaseError};
use skybond_protocol::identity::Address;
use skybond_protocol::storage::{PayoutReceipt, SuretyDb};

/// Releases passenger withdrawals by journaling a durable receipt.
pub struct ReceiptTreasury {
    db: Arc<SuretyDb>,
}

impl ReceiptTreasury {
    /// A treasury journaling into the given database.
    pub fn new(db: Arc<SuretyDb>) -> Self {
        Self { db }
    }
}

impl FundsRelease for ReceiptTreasury {
    fn release(&mut self, passenger: &Address, amount: u64) -> Result<(), ReleaseError> {
        let receipt = PayoutReceipt::new(*passenger, amount);
        self.db
            .record_payout(&receipt)
            .map_err(|e| ReleaseError(format!("payout journal write failed: {e}")))?;
        tracing::info!(%passenger, amount, receipt = %receipt.id, "payout receipt journaled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn release_journals_a_receipt() {
        let db = Arc::new(SuretyDb::open_temporary().unwrap());
        let mut treasury = ReceiptTreasury::new(Arc::clone(&db));

        treasury.release(&addr(7), 150).unwrap();

        let receipts = db.payouts().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].passenger, addr(7));
        assert_eq!(receipts[0].amount, 150);
    }

    #[test]
    fn each_release_gets_its_own_receipt() {
        let db = Arc::new(SuretyDb::open_temporary().unwrap());
        let mut treasury = ReceiptTreasury::new(Arc::clone(&db));

        treasury.release(&addr(7), 150).unwrap();
        treasury.release(&addr(7), 75).unwrap();

        assert_eq!(db.payout_count(), 2);
    }
}
