use alloy::primitives::{Address, U256};

use crate::num::Converter;

use super::PositionType;

/// Whether a conversion sizes an increase or a decrease of exposure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Collateral comes in, exposure grows.
    Open,
    /// Exposure shrinks, collateral goes out.
    Close,
}

/// Amount of a collateral asset to be valued in one sizing operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConversionRequest {
    pub asset: Address,
    pub amount: U256,
    pub direction: Direction,
}

impl ConversionRequest {
    pub fn open(asset: Address, amount: U256) -> Self {
        Self {
            asset,
            amount,
            direction: Direction::Open,
        }
    }

    pub fn close(asset: Address, amount: U256) -> Self {
        Self {
            asset,
            amount,
            direction: Direction::Close,
        }
    }
}

/// Trade parameters submitted to the exchange's `openPosition`.
///
/// `amount` is in canonical fixed point. With `is_exact_input` the amount is
/// what the wrapper gives up, otherwise what it receives; which token that is
/// follows from `is_base_to_quote`. A zero `opposite_amount_bound` means no
/// slippage bound.
#[derive(Clone, Copy, derive_more::Debug, Eq, PartialEq)]
pub struct TradeRequest {
    pub market: Address,
    pub is_base_to_quote: bool,
    pub is_exact_input: bool,
    #[debug("{}", Converter::canonical().from_unsigned::<4>(*amount))]
    pub amount: U256,
    pub opposite_amount_bound: U256,
    pub deadline: u64,
}

impl TradeRequest {
    /// Far-future deadline used when the caller does not provide one.
    pub const NO_DEADLINE: u64 = u64::MAX;

    /// Request growing the exposure of `side` by `base` units.
    pub fn increase(market: Address, side: PositionType, base: U256) -> Self {
        match side {
            PositionType::Short => Self::sell_base(market, base),
            PositionType::Long => Self::buy_base(market, base),
        }
    }

    /// Request shrinking the exposure of `side` by `base` units.
    pub fn decrease(market: Address, side: PositionType, base: U256) -> Self {
        match side {
            PositionType::Short => Self::buy_base(market, base),
            PositionType::Long => Self::sell_base(market, base),
        }
    }

    /// Exact-input sale of `base` units of the base asset.
    pub fn sell_base(market: Address, base: U256) -> Self {
        Self {
            market,
            is_base_to_quote: true,
            is_exact_input: true,
            amount: base,
            opposite_amount_bound: U256::ZERO,
            deadline: Self::NO_DEADLINE,
        }
    }

    /// Exact-output purchase of `base` units of the base asset.
    pub fn buy_base(market: Address, base: U256) -> Self {
        Self {
            market,
            is_base_to_quote: false,
            is_exact_input: false,
            amount: base,
            opposite_amount_bound: U256::ZERO,
            deadline: Self::NO_DEADLINE,
        }
    }

    /// Request moving `quote` units of quote value into or out of the
    /// position of `side`, used by funding rebalances.
    pub fn quote_for(market: Address, side: PositionType, quote: U256, increase: bool) -> Self {
        // Growing a short or shrinking a long sells base for an exact quote
        // output; the opposite spends an exact quote input on base.
        let is_base_to_quote = side.is_short() == increase;
        Self {
            market,
            is_base_to_quote,
            is_exact_input: !is_base_to_quote,
            amount: quote,
            opposite_amount_bound: U256::ZERO,
            deadline: Self::NO_DEADLINE,
        }
    }

    pub fn with_opposite_amount_bound(mut self, bound: U256) -> Self {
        self.opposite_amount_bound = bound;
        self
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Execution parameters of a funding rebalance trade.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RebalanceParams {
    /// Latest acceptable execution time, unix seconds. Zero means none.
    pub deadline: u64,
}
