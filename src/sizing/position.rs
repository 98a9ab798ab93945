use alloy::primitives::{Address, I256, U256};

use crate::{
    error::{LemmaError, Result},
    exchange::PriceOracle,
    num::{self, FeeRatio, WAD},
    types::{CollateralAsset, ConversionRequest, PositionType, TradeRequest},
};

use super::valuation::CollateralValuator;

/// Trade sized from a collateral intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sizing {
    pub request: TradeRequest,
    /// Collateral (native units) moving with the trade.
    pub collateral: U256,
    /// Base notional before fees used for the max-position check.
    pub exposure: U256,
}

/// Translates collateral amounts into exchange trade parameters for a
/// wrapper holding `side` exposure, and back.
#[derive(Debug)]
pub struct PositionSizer<'a, O> {
    valuator: CollateralValuator<'a, O>,
    side: PositionType,
}

impl<'a, O: PriceOracle> PositionSizer<'a, O> {
    pub fn new(valuator: CollateralValuator<'a, O>, side: PositionType) -> Self {
        Self { valuator, side }
    }

    pub fn valuator(&self) -> &CollateralValuator<'a, O> {
        &self.valuator
    }

    pub fn side(&self) -> PositionType {
        self.side
    }

    /// Sizes an opening trade backed by exactly `collateral_amount`.
    ///
    /// The ceiling is checked against the pre-fee notional: the fill is only
    /// known after execution and the gross amount bounds it from above.
    pub fn open_given_collateral(
        &self,
        collateral_amount: U256,
        asset: Address,
        size: I256,
        fee: FeeRatio,
        now: u64,
    ) -> Result<Sizing> {
        if collateral_amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let asset = self.valuator.asset(asset)?;
        let valuation = self
            .valuator
            .value(&ConversionRequest::open(asset.token(), collateral_amount), fee, now)?;
        self.check_max_position(asset, size, valuation.gross)?;

        if valuation.notional.is_zero() {
            return Err(LemmaError::InsufficientCollateral {
                required: U256::from(1),
                provided: collateral_amount,
            });
        }

        Ok(Sizing {
            request: TradeRequest::increase(asset.market(), self.side, valuation.notional),
            collateral: collateral_amount,
            exposure: valuation.gross,
        })
    }

    /// Sizes an opening trade of `base` units paid with `collateral_amount`,
    /// which must cover [`Self::collateral_amount_given_underlying_asset_amount`].
    pub fn open_given_base(
        &self,
        base: U256,
        collateral_amount: U256,
        asset: Address,
        size: I256,
        fee: FeeRatio,
        now: u64,
    ) -> Result<Sizing> {
        if base.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let asset = self.valuator.asset(asset)?;
        let valuation = self
            .valuator
            .value(&ConversionRequest::open(asset.token(), collateral_amount), fee, now)?;
        self.check_max_position(asset, size, valuation.gross)?;

        let required = self.collateral_for_base(asset, base, true, fee, now)?;
        if collateral_amount < required {
            return Err(LemmaError::InsufficientCollateral {
                required,
                provided: collateral_amount,
            });
        }

        Ok(Sizing {
            request: TradeRequest::increase(asset.market(), self.side, base),
            collateral: collateral_amount,
            exposure: valuation.gross,
        })
    }

    /// Sizes a closing trade that releases `collateral_amount`.
    ///
    /// Releasing everything a full close returns trades the whole held
    /// position; smaller amounts close the proportional fraction of it.
    pub fn close_given_collateral(
        &self,
        collateral_amount: U256,
        asset: Address,
        size: I256,
        fee: FeeRatio,
        now: u64,
    ) -> Result<Sizing> {
        if collateral_amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let asset = self.valuator.asset(asset)?;
        let held = self.side.held(size);
        let closeable = self.collateral_for_base(asset, held, false, fee, now)?;
        if collateral_amount > closeable {
            return Err(LemmaError::InsufficientPosition {
                requested: collateral_amount,
                available: closeable,
            });
        }

        let base = if collateral_amount == closeable {
            held
        } else {
            num::mul_div(held, collateral_amount, closeable)?
        };
        if base.is_zero() {
            return Err(LemmaError::InsufficientPosition {
                requested: collateral_amount,
                available: closeable,
            });
        }

        Ok(Sizing {
            request: TradeRequest::decrease(asset.market(), self.side, base),
            collateral: collateral_amount,
            exposure: base,
        })
    }

    /// Sizes a closing trade of `base` units releasing `collateral_amount`,
    /// which must not exceed what closing `base` returns.
    pub fn close_given_base(
        &self,
        base: U256,
        collateral_amount: U256,
        asset: Address,
        size: I256,
        fee: FeeRatio,
        now: u64,
    ) -> Result<Sizing> {
        if base.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let asset = self.valuator.asset(asset)?;
        let held = self.side.held(size);
        if base > held {
            return Err(LemmaError::InsufficientPosition {
                requested: base,
                available: held,
            });
        }

        let returned = self.collateral_for_base(asset, base, false, fee, now)?;
        if collateral_amount > returned {
            return Err(LemmaError::InsufficientCollateral {
                required: collateral_amount,
                provided: returned,
            });
        }

        Ok(Sizing {
            request: TradeRequest::decrease(asset.market(), self.side, base),
            collateral: collateral_amount,
            exposure: base,
        })
    }

    /// Collateral (native units) required to open, or returned by closing,
    /// `base` units of exposure. Opening rounds up, closing rounds down.
    pub fn collateral_amount_given_underlying_asset_amount(
        &self,
        base: U256,
        asset: Address,
        is_opening: bool,
        fee: FeeRatio,
        now: u64,
    ) -> Result<U256> {
        let asset = self.valuator.asset(asset)?;
        self.collateral_for_base(asset, base, is_opening, fee, now)
    }

    /// Quote-denominated trade moving unrealized funding `amount` into the
    /// position: positive funding grows the exposure, negative shrinks it.
    ///
    /// Growing trades are checked against the ceiling with the base the
    /// whole `amount` buys at the index price, before fees.
    pub fn rebalance_request(
        &self,
        amount: I256,
        asset: Address,
        size: I256,
        fee: FeeRatio,
    ) -> Result<TradeRequest> {
        if amount.is_zero() {
            return Err(LemmaError::ZeroAmount);
        }
        let asset = self.valuator.asset(asset)?;
        let increase = amount.is_positive();
        if increase {
            let index = self.valuator.index_price(asset.market())?;
            let base = num::mul_div(amount.unsigned_abs(), WAD, index)?;
            self.check_max_position(asset, size, base)?;
        }
        let quote = fee.net_of_fee(amount.unsigned_abs())?;
        Ok(TradeRequest::quote_for(
            asset.market(),
            self.side,
            quote,
            increase,
        ))
    }

    fn collateral_for_base(
        &self,
        asset: &CollateralAsset,
        base: U256,
        is_opening: bool,
        fee: FeeRatio,
        now: u64,
    ) -> Result<U256> {
        let prices = self.valuator.prices(asset, now)?;
        if is_opening {
            let gross = fee.gross_of_fee(base)?;
            self.valuator.base_to_collateral(asset, gross, prices, true)
        } else {
            let net = fee.net_of_fee(base)?;
            self.valuator.base_to_collateral(asset, net, prices, false)
        }
    }

    fn check_max_position(&self, asset: &CollateralAsset, size: I256, requested: U256) -> Result<()> {
        let current = size.unsigned_abs();
        let total = current.checked_add(requested).ok_or(LemmaError::Overflow)?;
        if total > asset.max_position() {
            return Err(LemmaError::MaxPositionReached {
                current,
                requested,
                max: asset.max_position(),
            });
        }
        Ok(())
    }
}
