use alloy::primitives::{I256, U256};

use crate::{
    num::{Converter, FeeRatio},
    types::RebalanceParams,
};

/// Default validity of a rebalance trade, seconds.
pub const DEFAULT_DEADLINE_OFFSET: u64 = 120;

/// Configuration for the rebalance logic (pure data, no IO concerns).
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq)]
pub struct RebalanceConfig {
    /// Unrealized funding PnL below this magnitude is left alone,
    /// canonical quote.
    #[debug("{}", Converter::canonical().from_unsigned::<4>(*min_amount))]
    pub min_amount: U256,

    /// Trade deadline relative to the time of evaluation, seconds.
    pub deadline_offset: u64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_amount: U256::ZERO,
            deadline_offset: DEFAULT_DEADLINE_OFFSET,
        }
    }
}

/// Funding state of a wrapper as read before a decision.
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq)]
pub struct FundingSnapshot {
    #[debug("{}", Converter::canonical().from_signed::<4>(*funding_pnl))]
    pub funding_pnl: I256,
    #[debug("{}", Converter::canonical().from_signed::<4>(*realized_funding_pnl))]
    pub realized_funding_pnl: I256,
    pub fee: FeeRatio,
}

impl FundingSnapshot {
    pub fn unrealized(&self) -> I256 {
        self.funding_pnl - self.realized_funding_pnl
    }
}

/// A single rebalance computed by the pure core.
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq)]
pub struct RebalanceAction {
    /// Funding PnL to realize, signed.
    #[debug("{}", Converter::canonical().from_signed::<4>(*amount))]
    pub amount: I256,

    /// Quote traded after the fee.
    #[debug("{}", Converter::canonical().from_unsigned::<4>(*trade_amount))]
    pub trade_amount: U256,

    /// Positive funding grows the exposure, negative shrinks it.
    pub increases_exposure: bool,

    pub deadline: u64,
}

impl RebalanceAction {
    pub fn params(&self) -> RebalanceParams {
        RebalanceParams {
            deadline: self.deadline,
        }
    }
}

/// Result of evaluating a snapshot (for logging/diagnostics).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebalanceSummary {
    pub snapshot: FundingSnapshot,
    pub unrealized: I256,
    pub below_threshold: bool,
    pub action: Option<RebalanceAction>,
}
