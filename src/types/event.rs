use alloy::primitives::{Address, I256, U256};

use crate::num::Converter;

/// Fill confirmation returned synchronously by the exchange.
///
/// `base` and `quote` are signed from the trader's point of view: selling
/// base yields a negative `base` and a positive `quote`. All amounts are in
/// canonical fixed point; `fee` is charged in quote on top of the trade.
#[derive(Clone, Copy, derive_more::Debug, PartialEq, Eq)]
pub struct PositionChanged {
    pub trader: Address,
    pub market: Address,
    #[debug("{}", Converter::canonical().from_signed::<4>(*base))]
    pub base: I256,
    #[debug("{}", Converter::canonical().from_signed::<4>(*quote))]
    pub quote: I256,
    #[debug("{}", Converter::canonical().from_unsigned::<4>(*fee))]
    pub fee: U256,
}

impl PositionChanged {
    /// Absolute base amount filled.
    pub fn base_filled(&self) -> U256 {
        self.base.unsigned_abs()
    }

    /// Absolute quote amount exchanged.
    pub fn quote_filled(&self) -> U256 {
        self.quote.unsigned_abs()
    }
}
