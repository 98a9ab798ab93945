use alloy::primitives::{Address, U256};

use crate::{
    error::{LemmaError, Result},
    exchange::PriceOracle,
    num::{self, Converter, FeeRatio, WAD},
    types::{AssetRegistry, CollateralAsset, ConversionRequest, Direction},
};

/// Prices used by one sizing operation, canonical fixed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prices {
    /// Collateral token in the settlement unit of account.
    pub collateral: U256,
    /// Base asset of the collateral's market.
    pub index: U256,
}

/// Collateral amount expressed as base-asset notional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Valuation {
    /// Collateral amount in canonical fixed point.
    pub canonical: U256,
    /// Base notional before fees.
    pub gross: U256,
    /// Base notional to trade. For openings the fee is taken out, for
    /// closings it is added so the proceeds still cover the collateral.
    pub notional: U256,
    pub prices: Prices,
}

/// Values collateral in base-asset notional using the price oracle.
#[derive(Debug)]
pub struct CollateralValuator<'a, O> {
    registry: &'a AssetRegistry,
    oracle: &'a O,
    max_price_age: u64,
    twap_interval: u32,
}

impl<'a, O: PriceOracle> CollateralValuator<'a, O> {
    pub fn new(
        registry: &'a AssetRegistry,
        oracle: &'a O,
        max_price_age: u64,
        twap_interval: u32,
    ) -> Self {
        Self {
            registry,
            oracle,
            max_price_age,
            twap_interval,
        }
    }

    pub fn asset(&self, token: Address) -> Result<&'a CollateralAsset> {
        self.registry.get(token)
    }

    /// Fresh collateral price, rejecting stale or non-positive answers.
    pub fn collateral_price(&self, asset: &CollateralAsset, now: u64) -> Result<U256> {
        let round = self.oracle.latest_round_data(asset.price_feed())?;
        if now.saturating_sub(round.updated_at) > self.max_price_age {
            return Err(LemmaError::StalePrice {
                feed: round.feed,
                updated_at: round.updated_at,
                now,
            });
        }
        if !round.answer.is_positive() {
            return Err(LemmaError::InvalidPrice(round.feed));
        }
        Converter::new(round.decimals).to_canonical(round.answer.unsigned_abs())
    }

    pub fn index_price(&self, market: Address) -> Result<U256> {
        let price = self.oracle.index_price(market, self.twap_interval)?;
        if price.is_zero() {
            return Err(LemmaError::InvalidPrice(market));
        }
        Ok(price)
    }

    pub fn prices(&self, asset: &CollateralAsset, now: u64) -> Result<Prices> {
        Ok(Prices {
            collateral: self.collateral_price(asset, now)?,
            index: self.index_price(asset.market())?,
        })
    }

    /// Base notional of the requested collateral amount.
    pub fn value(
        &self,
        request: &ConversionRequest,
        fee: FeeRatio,
        now: u64,
    ) -> Result<Valuation> {
        let asset = self.asset(request.asset)?;
        let prices = self.prices(asset, now)?;
        let canonical = asset.converter().to_canonical(request.amount)?;
        let gross = num::mul_div(canonical, prices.collateral, prices.index)?;
        let notional = match request.direction {
            Direction::Open => fee.net_of_fee(gross)?,
            Direction::Close => fee.gross_of_fee(gross)?,
        };
        Ok(Valuation {
            canonical,
            gross,
            notional,
            prices,
        })
    }

    /// Value of `amount` native units of `token` in the settlement unit of
    /// account, canonical fixed point.
    pub fn settlement_value(&self, token: Address, amount: U256, now: u64) -> Result<U256> {
        let asset = self.asset(token)?;
        let price = self.collateral_price(asset, now)?;
        let canonical = asset.converter().to_canonical(amount)?;
        num::mul_div(canonical, price, WAD)
    }

    /// Collateral (native units) worth `base` units of the market's base
    /// asset; `round_up` when the protocol is asking for funds.
    pub fn base_to_collateral(
        &self,
        asset: &CollateralAsset,
        base: U256,
        prices: Prices,
        round_up: bool,
    ) -> Result<U256> {
        let converter = asset.converter();
        if round_up {
            let canonical = num::mul_div_up(base, prices.index, prices.collateral)?;
            converter.from_canonical_up(canonical)
        } else {
            let canonical = num::mul_div(base, prices.index, prices.collateral)?;
            converter.from_canonical(canonical)
        }
    }
}
