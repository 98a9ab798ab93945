use alloy::primitives::Address;

use crate::{
    error::{LemmaError, Result},
    types::PositionType,
};

/// Default oracle staleness window, seconds.
pub const DEFAULT_MAX_PRICE_AGE: u64 = 3_600;

/// Default index price TWAP interval, seconds.
pub const DEFAULT_TWAP_INTERVAL: u32 = 900;

/// Wrapper instance configuration.
///
/// `account` is the identity the wrapper trades under at the exchange;
/// `usd_lemma` is the only caller allowed to move collateral and exposure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LemmaConfig {
    account: Address,
    owner: Address,
    usd_lemma: Address,
    rebalancer: Address,
    collateral: Address,
    settlement_token: Address,
    settlement_decimals: u8,
    side: PositionType,
    max_price_age: u64,
    twap_interval: u32,
}

impl LemmaConfig {
    pub fn new(
        account: Address,
        owner: Address,
        usd_lemma: Address,
        collateral: Address,
        settlement_token: Address,
        settlement_decimals: u8,
    ) -> Result<Self> {
        for (address, what) in [
            (account, "account"),
            (owner, "owner"),
            (usd_lemma, "usd lemma"),
            (collateral, "collateral"),
            (settlement_token, "settlement token"),
        ] {
            if address.is_zero() {
                return Err(LemmaError::ZeroAddress(what));
            }
        }
        Ok(Self {
            account,
            owner,
            usd_lemma,
            rebalancer: Address::ZERO,
            collateral,
            settlement_token,
            settlement_decimals,
            side: PositionType::Short,
            max_price_age: DEFAULT_MAX_PRICE_AGE,
            twap_interval: DEFAULT_TWAP_INTERVAL,
        })
    }

    pub fn with_rebalancer(mut self, rebalancer: Address) -> Self {
        self.rebalancer = rebalancer;
        self
    }

    /// Exposure the wrapper holds; short backs a synthetic dollar.
    pub fn with_side(mut self, side: PositionType) -> Self {
        self.side = side;
        self
    }

    pub fn with_max_price_age(mut self, seconds: u64) -> Self {
        self.max_price_age = seconds;
        self
    }

    pub fn with_twap_interval(mut self, seconds: u32) -> Self {
        self.twap_interval = seconds;
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn usd_lemma(&self) -> Address {
        self.usd_lemma
    }

    /// Zero when no rebalancer is assigned.
    pub fn rebalancer(&self) -> Address {
        self.rebalancer
    }

    pub fn collateral(&self) -> Address {
        self.collateral
    }

    pub fn settlement_token(&self) -> Address {
        self.settlement_token
    }

    pub fn settlement_decimals(&self) -> u8 {
        self.settlement_decimals
    }

    pub fn side(&self) -> PositionType {
        self.side
    }

    pub fn max_price_age(&self) -> u64 {
        self.max_price_age
    }

    pub fn twap_interval(&self) -> u32 {
        self.twap_interval
    }

    pub(crate) fn set_usd_lemma(&mut self, usd_lemma: Address) {
        self.usd_lemma = usd_lemma;
    }

    pub(crate) fn set_rebalancer(&mut self, rebalancer: Address) {
        self.rebalancer = rebalancer;
    }
}
