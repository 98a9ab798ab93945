//! Fixed-point arithmetic shared by sizing, valuation and leverage reporting.
//!
//! Every amount crossing a token boundary is converted into the canonical
//! 18-decimal representation first. Conversions into coarser scales
//! truncate; the `_up` variants round towards positive infinity and are used
//! wherever the protocol asks a caller for funds.

use alloy::primitives::{I256, U256};
use fastnum::{
    UD64, bint,
    decimal::{Context, Decimal, RoundingMode, UnsignedDecimal},
};

use crate::error::{LemmaError, Result};

/// Decimal precision of the canonical fixed-point representation.
pub const CANONICAL_DECIMALS: u8 = 18;

/// One unit in canonical fixed point.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Converter between a token's native precision, canonical fixed point
/// and human-readable decimals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Converter {
    decimals: i32,
}

impl Converter {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals: decimals as i32,
        }
    }

    /// Canonical 18-decimal converter.
    pub fn canonical() -> Self {
        Self::new(CANONICAL_DECIMALS)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals as u8
    }

    /// Native amount to canonical fixed point.
    ///
    /// Precisions above 18 decimals lose their excess digits here; this is
    /// the only lossy step on the way in.
    pub fn to_canonical(&self, amount: U256) -> Result<U256> {
        let shift = CANONICAL_DECIMALS as i32 - self.decimals;
        if shift >= 0 {
            amount
                .checked_mul(pow10(shift as u32))
                .ok_or(LemmaError::Overflow)
        } else {
            Ok(amount / pow10(shift.unsigned_abs()))
        }
    }

    /// Canonical fixed point to native amount, truncating sub-unit dust.
    pub fn from_canonical(&self, amount: U256) -> Result<U256> {
        let shift = CANONICAL_DECIMALS as i32 - self.decimals;
        if shift >= 0 {
            Ok(amount / pow10(shift as u32))
        } else {
            amount
                .checked_mul(pow10(shift.unsigned_abs()))
                .ok_or(LemmaError::Overflow)
        }
    }

    /// Same as [`Self::from_canonical`] but any truncated dust rounds the
    /// result up by one native unit.
    pub fn from_canonical_up(&self, amount: U256) -> Result<U256> {
        let shift = CANONICAL_DECIMALS as i32 - self.decimals;
        if shift > 0 {
            let unit = pow10(shift as u32);
            let (quotient, remainder) = amount.div_rem(unit);
            Ok(if remainder.is_zero() {
                quotient
            } else {
                quotient + U256::from(1)
            })
        } else {
            self.from_canonical(amount)
        }
    }

    /// Sign-preserving [`Self::to_canonical`]; truncates towards zero.
    pub fn to_canonical_signed(&self, amount: I256) -> Result<I256> {
        let magnitude = self.to_canonical(amount.unsigned_abs())?;
        signed(magnitude, amount.is_negative())
    }

    /// Sign-preserving [`Self::from_canonical`]; truncates towards zero.
    pub fn from_canonical_signed(&self, amount: I256) -> Result<I256> {
        let magnitude = self.from_canonical(amount.unsigned_abs())?;
        signed(magnitude, amount.is_negative())
    }

    /// One native unit expressed in canonical fixed point.
    pub fn unit(&self) -> Result<U256> {
        self.to_canonical(U256::from(1))
    }

    pub fn from_unsigned<const N: usize>(&self, value: U256) -> UnsignedDecimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(value.as_le_slice())
            .expect("Converter: U256 -> UInt::<N>");
        UnsignedDecimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            Context::default().with_rounding_mode(RoundingMode::Floor),
        )
    }

    pub fn from_signed<const N: usize>(&self, value: I256) -> Decimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(value.unsigned_abs().as_le_slice())
            .expect("Converter: abs(I256) -> UInt::<N>");
        Decimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            match value.sign() {
                alloy::primitives::Sign::Negative => fastnum::decimal::Sign::Minus,
                alloy::primitives::Sign::Positive => fastnum::decimal::Sign::Plus,
            },
            Context::default().with_rounding_mode(RoundingMode::Floor),
        )
    }

    pub fn to_unsigned<const N: usize>(&self, value: UnsignedDecimal<N>) -> U256 {
        let rescaled = value.rescale(self.decimals as i16);
        U256::from_le_slice(rescaled.digits().to_radix_le(256).as_slice())
    }

    pub fn to_signed<const N: usize>(&self, value: Decimal<N>) -> I256 {
        let rescaled = value.rescale(self.decimals as i16);
        let mut res = I256::try_from_le_slice(rescaled.digits().to_radix_le(256).as_slice())
            .unwrap_or_default();
        if value.is_negative() {
            res = res.saturating_neg();
        }
        res
    }
}

/// Exchange trading fee in parts per million (`10_000` is 1%).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeeRatio(u32);

impl FeeRatio {
    pub const SCALE: u32 = 1_000_000;

    pub fn new(ppm: u32) -> Result<Self> {
        if ppm >= Self::SCALE {
            return Err(LemmaError::InvalidFeeRatio(ppm));
        }
        Ok(Self(ppm))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn ppm(&self) -> u32 {
        self.0
    }

    /// Amount left after the fee is taken, rounded down.
    pub fn net_of_fee(&self, amount: U256) -> Result<U256> {
        mul_div(amount, self.complement(), U256::from(Self::SCALE))
    }

    /// Amount that leaves `amount` after the fee is taken, rounded up.
    pub fn gross_of_fee(&self, amount: U256) -> Result<U256> {
        mul_div_up(amount, U256::from(Self::SCALE), self.complement())
    }

    /// Fee as a fraction, for logs.
    pub fn as_decimal(&self) -> UD64 {
        Converter::new(6).from_unsigned(U256::from(self.0))
    }

    fn complement(&self) -> U256 {
        U256::from(Self::SCALE - self.0)
    }
}

/// `a * b / denominator`, rounded down.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(LemmaError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(LemmaError::Overflow)?;
    Ok(product / denominator)
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(LemmaError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(LemmaError::Overflow)?;
    let (quotient, remainder) = product.div_rem(denominator);
    Ok(if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::from(1)
    })
}

/// Re-applies a sign to a magnitude produced by unsigned arithmetic.
pub fn signed(magnitude: U256, negative: bool) -> Result<I256> {
    let value = I256::try_from(magnitude).map_err(|_| LemmaError::Overflow)?;
    Ok(if negative { -value } else { value })
}

fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}
