//! Pure functional core for funding rebalance decisions.
//!
//! Functions here take a snapshot and return decisions, with no IO and no
//! logging.

use super::types::{FundingSnapshot, RebalanceAction, RebalanceConfig, RebalanceSummary};

/// Compute the rebalance for a funding snapshot, if one is due.
///
/// The whole unrealized funding PnL is realized at once. Nothing is done
/// when it is zero, below `config.min_amount` or vanishes after the fee.
pub fn compute_rebalance(
    snapshot: &FundingSnapshot,
    config: &RebalanceConfig,
    now: u64,
) -> Option<RebalanceAction> {
    let unrealized = snapshot.unrealized();
    if unrealized.is_zero() || unrealized.unsigned_abs() < config.min_amount {
        return None;
    }

    let trade_amount = snapshot.fee.net_of_fee(unrealized.unsigned_abs()).ok()?;
    if trade_amount.is_zero() {
        return None;
    }

    Some(RebalanceAction {
        amount: unrealized,
        trade_amount,
        increases_exposure: unrealized.is_positive(),
        deadline: now.saturating_add(config.deadline_offset),
    })
}

/// Compute a summary of the snapshot together with the decision.
pub fn evaluate(snapshot: &FundingSnapshot, config: &RebalanceConfig, now: u64) -> RebalanceSummary {
    let unrealized = snapshot.unrealized();
    RebalanceSummary {
        snapshot: *snapshot,
        unrealized,
        below_threshold: unrealized.unsigned_abs() < config.min_amount,
        action: compute_rebalance(snapshot, config, now),
    }
}
