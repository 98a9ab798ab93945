//! Funding rebalancing.
//!
//! The decision is made by the pure core in [`strategy`] from a
//! [`FundingSnapshot`]; [`Rebalancer`] reads the snapshot from a
//! [`RebalanceTarget`], applies the decision and logs the outcome.
//! Snapshots are re-read on every run, so a retry after a successful
//! rebalance finds nothing left to realize.

pub mod strategy;
pub mod types;

use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    exchange::{PerpExchange, PriceOracle},
    num::Converter,
    state::PerpLemma,
    types::PositionChanged,
};

pub use strategy::{compute_rebalance, evaluate};
pub use types::*;

/// Wrapper whose funding PnL can be rebalanced.
pub trait RebalanceTarget {
    /// Current time of the target's ledger, unix seconds.
    fn now(&self) -> u64;

    fn funding_snapshot(&self) -> Result<FundingSnapshot>;

    /// Realizes `action` on behalf of `rebalancer`.
    fn rebalance_funding(
        &mut self,
        rebalancer: Address,
        action: &RebalanceAction,
    ) -> Result<PositionChanged>;
}

impl<E: PerpExchange, O: PriceOracle> RebalanceTarget for PerpLemma<E, O> {
    fn now(&self) -> u64 {
        self.exchange().block_timestamp()
    }

    fn funding_snapshot(&self) -> Result<FundingSnapshot> {
        Ok(FundingSnapshot {
            funding_pnl: self.funding_pnl()?,
            realized_funding_pnl: self.realized_funding_pnl(),
            fee: self.fee()?,
        })
    }

    // Routed through the USDLemma, which is the only caller the wrapper
    // accepts.
    fn rebalance_funding(
        &mut self,
        rebalancer: Address,
        action: &RebalanceAction,
    ) -> Result<PositionChanged> {
        let usd_lemma = self.config().usd_lemma();
        self.rebalance(usd_lemma, rebalancer, action.amount, action.params())
    }
}

/// In-process rebalancing driver.
#[derive(Clone, Debug)]
pub struct Rebalancer {
    config: RebalanceConfig,
    identity: Address,
}

impl Rebalancer {
    pub fn new(config: RebalanceConfig, identity: Address) -> Self {
        Self { config, identity }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Evaluates `target` once and rebalances if due.
    pub fn run_once<T: RebalanceTarget>(&self, target: &mut T) -> Result<Option<PositionChanged>> {
        let snapshot = target.funding_snapshot()?;
        let summary = evaluate(&snapshot, &self.config, target.now());
        debug!(?summary, "Funding evaluated");

        let Some(action) = summary.action else {
            return Ok(None);
        };
        info!(
            amount = %Converter::canonical().from_signed::<4>(action.amount),
            trade_amount = %Converter::canonical().from_unsigned::<4>(action.trade_amount),
            increases_exposure = action.increases_exposure,
            "Rebalancing funding"
        );
        target.rebalance_funding(self.identity, &action).map(Some)
    }

    /// Runs `ticks` evaluations `period` apart, logging failures and
    /// retrying them on the next tick. Returns the number of rebalances.
    pub async fn run<T: RebalanceTarget>(&self, target: &mut T, period: Duration, ticks: usize) -> usize {
        let mut interval = tokio::time::interval(period);
        let mut rebalanced = 0;
        for _ in 0..ticks {
            interval.tick().await;
            match self.run_once(target) {
                Ok(Some(fill)) => {
                    rebalanced += 1;
                    info!(?fill, "Rebalance executed");
                }
                Ok(None) => debug!("Nothing to rebalance"),
                Err(e) if e.is_retryable() => warn!(%e, "Rebalance failed, will retry"),
                Err(e) => error!(%e, "Rebalance failed"),
            }
        }
        rebalanced
    }
}
