use alloy::primitives::I256;

use crate::error::{LemmaError, Result};

/// Funding PnL bookkeeping of the wrapper, canonical quote.
///
/// `total` accumulates every funding payment folded in from the exchange,
/// `realized` the part already turned into exposure by rebalances. Pending
/// funding stays at the exchange until [`FundingLedger::fold`] is called, so
/// readers always add it on top.
#[derive(Clone, Copy, derive_more::Debug, Default, PartialEq, Eq)]
pub struct FundingLedger {
    #[debug("{total}")]
    total: I256,
    #[debug("{realized}")]
    realized: I256,
}

impl FundingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Funding already folded into the ledger.
    pub fn total(&self) -> I256 {
        self.total
    }

    /// Funding already realized by rebalances.
    pub fn realized(&self) -> I256 {
        self.realized
    }

    /// Funding PnL including `pending`, the amount the exchange reports as
    /// owed by the wrapper (positive means the wrapper pays).
    pub fn funding_pnl(&self, pending: I256) -> I256 {
        self.total - pending
    }

    /// Funding PnL not yet realized.
    pub fn unrealized(&self, pending: I256) -> I256 {
        self.funding_pnl(pending) - self.realized
    }

    /// Folds a pending payment that the exchange has just settled.
    pub(crate) fn fold(&mut self, pending: I256) {
        self.total -= pending;
    }

    /// Checks that `amount` can be realized: non-zero, on the side of the
    /// unrealized PnL and not beyond it.
    pub fn check_realizable(&self, amount: I256, pending: I256) -> Result<()> {
        let unrealized = self.unrealized(pending);
        let fits = !amount.is_zero()
            && amount.is_negative() == unrealized.is_negative()
            && amount.unsigned_abs() <= unrealized.unsigned_abs();
        if !fits {
            return Err(LemmaError::InvalidRebalanceAmount {
                requested: amount,
                unrealized,
            });
        }
        Ok(())
    }

    pub(crate) fn realize(&mut self, amount: I256) {
        self.realized += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i(value: i64) -> I256 {
        I256::try_from(value).unwrap()
    }

    #[test]
    fn test_pending_funding_counts_before_fold() {
        let mut ledger = FundingLedger::new();

        // wrapper is owed 10
        assert_eq!(ledger.funding_pnl(i(-10)), i(10));

        // folding does not change the reported PnL
        ledger.fold(i(-10));
        assert_eq!(ledger.funding_pnl(I256::ZERO), i(10));
        assert_eq!(ledger.total(), i(10));
    }

    #[test]
    fn test_realizing_twice_is_rejected() {
        let mut ledger = FundingLedger::new();
        ledger.fold(i(-10));

        assert!(ledger.check_realizable(i(10), I256::ZERO).is_ok());
        ledger.realize(i(10));
        assert_eq!(ledger.unrealized(I256::ZERO), I256::ZERO);

        // a retry of the same rebalance finds nothing left
        assert_eq!(
            ledger.check_realizable(i(10), I256::ZERO),
            Err(LemmaError::InvalidRebalanceAmount {
                requested: i(10),
                unrealized: I256::ZERO,
            })
        );
    }

    #[test]
    fn test_partial_realization() {
        let mut ledger = FundingLedger::new();
        ledger.fold(i(-10));

        assert!(ledger.check_realizable(i(4), I256::ZERO).is_ok());
        ledger.realize(i(4));
        assert_eq!(ledger.unrealized(I256::ZERO), i(6));
        assert!(ledger.check_realizable(i(7), I256::ZERO).is_err());
        assert!(ledger.check_realizable(i(6), I256::ZERO).is_ok());
    }

    #[test]
    fn test_sign_mismatch_is_rejected() {
        let ledger = FundingLedger::new();

        // wrapper paid 5 in funding
        assert!(ledger.check_realizable(i(-5), i(5)).is_ok());
        assert!(ledger.check_realizable(i(5), i(5)).is_err());
        assert!(ledger.check_realizable(I256::ZERO, i(5)).is_err());
    }
}
