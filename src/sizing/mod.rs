//! Collateral valuation and trade sizing.
//!
//! [`CollateralValuator`] turns collateral amounts into base-asset notional
//! using the price oracle; [`PositionSizer`] turns collateral intents into
//! [`crate::types::TradeRequest`]s and answers the inverse question of how
//! much collateral a given notional costs or returns.

pub mod position;
pub mod valuation;

pub use position::{PositionSizer, Sizing};
pub use valuation::{CollateralValuator, Prices, Valuation};
