//! Interfaces of the external collaborators.
//!
//! Calls are synchronous request/response: a trade is confirmed by the
//! returned [`PositionChanged`], not by a later event. Implementations are
//! expected to be fail-atomic per call, the way a ledger transaction is.

use alloy::primitives::{Address, I256, U256};

use crate::{
    error::ExchangeError,
    types::{MarketStatus, PositionChanged, RoundData, TradeRequest},
};

/// Perpetual exchange: clearing house, margin vault, account balance and
/// market registry views of a single venue.
pub trait PerpExchange {
    /// Executes a trade for `trader` and reports the fill.
    fn open_position(
        &mut self,
        trader: Address,
        request: &TradeRequest,
    ) -> Result<PositionChanged, ExchangeError>;

    /// Signed position size of `trader` in `market`, canonical base units.
    fn total_position_size(&self, trader: Address, market: Address) -> Result<I256, ExchangeError>;

    /// Account value of `trader` including unrealized PnL, canonical quote.
    fn account_value(&self, trader: Address) -> Result<I256, ExchangeError>;

    /// Trading fee of `market`.
    fn fee_ratio(&self, market: Address) -> Result<u32, ExchangeError>;

    /// Moves `amount` of `token` (native decimals) into the margin vault.
    fn deposit(&mut self, trader: Address, token: Address, amount: U256)
    -> Result<(), ExchangeError>;

    /// Moves `amount` of `token` (native decimals) out of the margin vault.
    fn withdraw(
        &mut self,
        trader: Address,
        token: Address,
        amount: U256,
    ) -> Result<(), ExchangeError>;

    /// Vault balance of `token` held for `trader`, native decimals.
    fn balance_by_token(&self, trader: Address, token: Address) -> Result<U256, ExchangeError>;

    /// Funding owed by `trader` in `market` and not yet settled, canonical
    /// quote. Positive means the trader pays.
    fn pending_funding_payment(
        &self,
        trader: Address,
        market: Address,
    ) -> Result<I256, ExchangeError>;

    /// Settles all pending funding of `trader` into its realized PnL.
    fn settle_all_funding(&mut self, trader: Address) -> Result<(), ExchangeError>;

    fn market_status(&self, market: Address) -> Result<MarketStatus, ExchangeError>;

    /// Closes the position of `trader` in a closed market at its settlement
    /// price.
    fn quit_market(
        &mut self,
        trader: Address,
        market: Address,
    ) -> Result<PositionChanged, ExchangeError>;

    /// Current ledger time, unix seconds.
    fn block_timestamp(&self) -> u64;
}

/// Price source for collateral valuation and index prices.
pub trait PriceOracle {
    /// Latest answer of `feed`.
    fn latest_round_data(&self, feed: Address) -> Result<RoundData, ExchangeError>;

    /// Index price of `market` averaged over `twap_interval` seconds,
    /// canonical fixed point.
    fn index_price(&self, market: Address, twap_interval: u32) -> Result<U256, ExchangeError>;
}
