//! Basis-trading engine backing a synthetic dollar with perpetual positions.
//!
//! # Overview
//!
//! Collateral handed to the synthetic dollar is deposited at a perpetual
//! exchange and hedged with an opposite position of the same notional, so
//! the pair holds its dollar value whatever the price of the underlying.
//!
//! [`num`] converts token amounts of any precision to and from the canonical
//! 18-decimal fixed point. [`sizing::CollateralValuator`] values collateral
//! in base-asset notional and [`sizing::PositionSizer`] turns collateral
//! amounts into [`types::TradeRequest`]s and back.
//!
//! [`state::PerpLemma`] owns the position for one collateral asset: it opens
//! and closes against the [`exchange::PerpExchange`], tracks funding PnL,
//! reports leverage and handles emergency settlement of closed markets.
//!
//! [`rebalance`] decides when accrued funding PnL is traded back into the
//! position; the `rebalancer` binary runs it against deployed contracts.
//!
//! # Testing
//!
//! [`testing`] module provides an in-memory exchange and price oracle plus
//! builders wiring a wrapper to them. See `./tests` for examples.

pub mod abi;
pub mod error;
pub mod exchange;
pub mod num;
pub mod rebalance;
pub mod sizing;
pub mod state;
pub mod testing;
pub mod types;

use alloy::primitives::Address;

#[derive(Clone, Debug)]
/// Deployed contracts of one synthetic dollar wrapper.
pub struct Deployment {
    chain_id: u64,
    usd_lemma: Address,
    perp_lemma: Address,
    perpetual_dex_index: u64,
    settlement_token: Address,
    collateral: Address,
    base_token: Address,
    market_registry: Address,
}

impl Deployment {
    #[allow(clippy::too_many_arguments)]
    pub fn custom(
        chain_id: u64,
        usd_lemma: Address,
        perp_lemma: Address,
        perpetual_dex_index: u64,
        settlement_token: Address,
        collateral: Address,
        base_token: Address,
        market_registry: Address,
    ) -> Self {
        Self {
            chain_id,
            usd_lemma,
            perp_lemma,
            perpetual_dex_index,
            settlement_token,
            collateral,
            base_token,
            market_registry,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn usd_lemma(&self) -> Address {
        self.usd_lemma
    }

    pub fn perp_lemma(&self) -> Address {
        self.perp_lemma
    }

    /// Index of the perpetual exchange at the USDLemma.
    pub fn perpetual_dex_index(&self) -> u64 {
        self.perpetual_dex_index
    }

    pub fn settlement_token(&self) -> Address {
        self.settlement_token
    }

    pub fn collateral(&self) -> Address {
        self.collateral
    }

    /// Base token identifying the market at the exchange.
    pub fn base_token(&self) -> Address {
        self.base_token
    }

    pub fn market_registry(&self) -> Address {
        self.market_registry
    }
}
