use alloy::primitives::{Address, U256};

use crate::types::MarketStatus;

pub type Result<T> = std::result::Result<T, LemmaError>;

/// Failure reported by the external exchange or price oracle.
///
/// Only the wrapper's own checks are expressed in [`LemmaError`]; whatever
/// the collaborators refuse to do surfaces here and is propagated as is.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("exchange reverted: {0}")]
    Reverted(String),

    #[error("opposite amount bound violated, bound: {bound}, actual: {actual}")]
    SlippageExceeded { bound: U256, actual: U256 },

    #[error("trade deadline {deadline} passed at {now}")]
    DeadlineExpired { deadline: u64, now: u64 },

    #[error("insufficient vault balance of {token}: requested {requested}, available {available}")]
    InsufficientVaultBalance {
        token: Address,
        requested: U256,
        available: U256,
    },

    #[error("market {market} is {status:?}")]
    MarketUnavailable {
        market: Address,
        status: MarketStatus,
    },

    #[error("unknown market: {0}")]
    UnknownMarket(Address),

    #[error("no price for feed: {0}")]
    NoPrice(Address),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Error returned by the wrapper, the sizing algorithm and the valuator.
///
/// Every variant leaves the wrapper state as it was before the call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LemmaError {
    #[error("collateral asset not registered: {0}")]
    InvalidAsset(Address),

    #[error("zero address is not allowed for {0}")]
    ZeroAddress(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("price feed {feed} is stale, updated at {updated_at}, now {now}")]
    StalePrice {
        feed: Address,
        updated_at: u64,
        now: u64,
    },

    #[error("price feed {0} reported a non-positive price")]
    InvalidPrice(Address),

    #[error("amount must not be zero")]
    ZeroAmount,

    #[error("fee ratio {0} ppm is out of range")]
    InvalidFeeRatio(u32),

    #[error("max position reached: current {current} + requested {requested} > max {max}")]
    MaxPositionReached {
        current: U256,
        requested: U256,
        max: U256,
    },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },

    #[error("insufficient position: requested {requested}, available {available}")]
    InsufficientPosition { requested: U256, available: U256 },

    #[error("insufficient collateral: required {required}, provided {provided}")]
    InsufficientCollateral { required: U256, provided: U256 },

    #[error("caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("market {0} is not closed")]
    MarketNotClosed(Address),

    #[error("position already settled")]
    AlreadySettled,

    #[error("rebalance amount {requested} does not fit unrealized funding PnL {unrealized}")]
    InvalidRebalanceAmount {
        requested: alloy::primitives::I256,
        unrealized: alloy::primitives::I256,
    },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

impl LemmaError {
    /// Capacity and external-data failures may succeed when retried later or
    /// with a smaller amount; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MaxPositionReached { .. }
                | Self::StalePrice { .. }
                | Self::Exchange(ExchangeError::Transport(_))
                | Self::Exchange(ExchangeError::DeadlineExpired { .. })
                | Self::Exchange(ExchangeError::SlippageExceeded { .. })
        )
    }
}
