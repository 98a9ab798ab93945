mod asset;
mod event;
mod request;

pub use asset::{AssetConfig, AssetRegistry, CollateralAsset};
pub use event::PositionChanged;
pub use request::{ConversionRequest, Direction, RebalanceParams, TradeRequest};

use alloy::primitives::{Address, I256};

/// Side of the wrapper's own exposure in the base-asset market.
///
/// The wrapper takes the opposite side of the synthetic holder: backing a
/// synthetic dollar means being short the underlying.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Long,
    #[default]
    Short,
}

impl PositionType {
    pub fn is_long(&self) -> bool {
        matches!(self, PositionType::Long)
    }

    pub fn is_short(&self) -> bool {
        matches!(self, PositionType::Short)
    }

    /// Magnitude of `size` if it lies on this side, zero otherwise.
    pub fn held(&self, size: I256) -> alloy::primitives::U256 {
        match self {
            PositionType::Long if size.is_positive() => size.unsigned_abs(),
            PositionType::Short if size.is_negative() => size.unsigned_abs(),
            _ => alloy::primitives::U256::ZERO,
        }
    }
}

/// Trading status of a base-asset market at the exchange.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum MarketStatus {
    #[default]
    Open,
    Paused,
    Closed,
}

/// Latest answer of a price feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundData {
    pub feed: Address,
    pub round_id: u128,
    pub answer: I256,
    pub decimals: u8,
    pub updated_at: u64,
}

/// Lifecycle of the wrapper's position.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum LemmaState {
    #[default]
    Idle,
    Open,
}
