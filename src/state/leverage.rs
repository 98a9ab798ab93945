use alloy::primitives::U256;
use fastnum::UD256;

use crate::{
    error::Result,
    num::{self, Converter, WAD},
};

const SIX_DECIMALS: U256 = U256::from_limbs([1_000_000_000_000, 0, 0, 0]);

/// Collateral value over position value.
///
/// Both fields come from the same 18-decimal ratio: `six_decimals` keeps six
/// digits of it, `unit` none. A flat position reports zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Leverage {
    pub six_decimals: U256,
    pub unit: U256,
}

impl Leverage {
    pub const ZERO: Self = Self {
        six_decimals: U256::ZERO,
        unit: U256::ZERO,
    };

    /// Leverage of `collateral_value` (canonical quote) backing `size`
    /// canonical base units at `index_price`.
    pub fn compute(collateral_value: U256, size: U256, index_price: U256) -> Result<Self> {
        let position_value = num::mul_div(size, index_price, WAD)?;
        if position_value.is_zero() {
            return Ok(Self::ZERO);
        }
        let ratio = num::mul_div(collateral_value, WAD, position_value)?;
        Ok(Self {
            six_decimals: ratio / SIX_DECIMALS,
            unit: ratio / WAD,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.six_decimals.is_zero()
    }

    /// The ratio with six decimals, for logs.
    pub fn as_decimal(&self) -> UD256 {
        Converter::new(6).from_unsigned(self.six_decimals)
    }
}
