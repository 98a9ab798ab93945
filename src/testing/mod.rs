//! In-memory testing environment and test utilities.
//!
//! [`MockExchange`] and [`MockOracle`] stand in for the perpetual exchange
//! and the price feeds: trades fill at the oracle index price with a ppm fee,
//! funding accrues on demand and markets can be paused or closed.
//!
//! [`LemmaBuilder`] wires a [`PerpLemma`] to both mocks with an ETH market,
//! a WETH collateral and a USDC settlement token, returning a [`TestLemma`]
//! that keeps handles on the participants.
//!
//! [`AssetBuilder`] creates [`CollateralAsset`]s with deterministic
//! addresses for unit tests of valuation and sizing.

mod mock;

use alloy::primitives::{Address, I256, U256, keccak256};

use crate::{
    state::{CloseOutcome, LemmaConfig, PerpLemma},
    types::{AssetRegistry, CollateralAsset, PositionChanged, PositionType},
};

pub use mock::{MockExchange, MockOracle};

/// Clock of freshly built test environments.
pub const GENESIS: u64 = 1_700_000_000;

/// Decimals of the USD price feeds.
pub const FEED_DECIMALS: u8 = 8;

/// `amount` whole units at `decimals` of precision.
pub fn scale(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

/// `amount` whole units in canonical fixed point.
pub fn ether(amount: u64) -> U256 {
    scale(amount, 18)
}

/// `amount` whole units of a 6-decimal stablecoin.
pub fn usd(amount: u64) -> U256 {
    scale(amount, 6)
}

/// Deterministic address derived from a label.
pub fn named_address(label: &str) -> Address {
    Address::from_word(keccak256(label.as_bytes()))
}

/// ETH market used by default.
pub fn eth_market() -> Address {
    named_address("market:ETH")
}

/// Builder of [`CollateralAsset`]s with addresses derived from the symbol.
#[derive(Clone, Debug)]
pub struct AssetBuilder {
    symbol: String,
    decimals: u8,
    token: Address,
    market: Address,
    max_position: U256,
    price_feed: Address,
}

impl AssetBuilder {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            token: named_address(&format!("token:{symbol}")),
            market: eth_market(),
            max_position: ether(1_000_000),
            price_feed: named_address(&format!("feed:{symbol}")),
        }
    }

    pub fn token(mut self, token: Address) -> Self {
        self.token = token;
        self
    }

    pub fn market(mut self, market: Address) -> Self {
        self.market = market;
        self
    }

    pub fn max_position(mut self, max_position: U256) -> Self {
        self.max_position = max_position;
        self
    }

    pub fn build(self) -> CollateralAsset {
        CollateralAsset::new(
            self.symbol,
            self.token,
            self.decimals,
            self.market,
            self.max_position,
            self.price_feed,
        )
        .unwrap()
    }
}

/// Builder of a [`PerpLemma`] wired to in-memory collaborators.
///
/// Defaults: short wrapper backing 18-decimal WETH priced at 2000 USD, ETH
/// index price 2000, 1% fee, settlement in 6-decimal USDC.
#[derive(Clone, Debug)]
pub struct LemmaBuilder {
    collateral_symbol: String,
    collateral_decimals: u8,
    collateral_price: i64,
    index_price: U256,
    max_position: U256,
    fee_ppm: u32,
    side: PositionType,
    settlement_collateral: bool,
}

impl Default for LemmaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LemmaBuilder {
    pub fn new() -> Self {
        Self {
            collateral_symbol: "WETH".to_string(),
            collateral_decimals: 18,
            collateral_price: 2_000,
            index_price: ether(2_000),
            max_position: ether(1_000_000),
            fee_ppm: 10_000,
            side: PositionType::Short,
            settlement_collateral: false,
        }
    }

    /// Collateral token with its USD price in whole units.
    pub fn collateral(mut self, symbol: &str, decimals: u8, price: i64) -> Self {
        self.collateral_symbol = symbol.to_string();
        self.collateral_decimals = decimals;
        self.collateral_price = price;
        self
    }

    /// Uses the settlement token itself as collateral.
    pub fn settlement_collateral(mut self) -> Self {
        self.settlement_collateral = true;
        self
    }

    pub fn index_price(mut self, price: U256) -> Self {
        self.index_price = price;
        self
    }

    pub fn max_position(mut self, max_position: U256) -> Self {
        self.max_position = max_position;
        self
    }

    pub fn fee_ppm(mut self, fee_ppm: u32) -> Self {
        self.fee_ppm = fee_ppm;
        self
    }

    pub fn side(mut self, side: PositionType) -> Self {
        self.side = side;
        self
    }

    pub fn build(self) -> TestLemma {
        let market = eth_market();
        let oracle = MockOracle::new(GENESIS);
        oracle.set_index_price(market, self.index_price);

        let settlement = AssetBuilder::new("USDC", 6)
            .max_position(self.max_position)
            .build();
        oracle.set_price(settlement.price_feed(), 1, FEED_DECIMALS);

        let asset = if self.settlement_collateral {
            settlement.clone()
        } else {
            let asset = AssetBuilder::new(&self.collateral_symbol, self.collateral_decimals)
                .max_position(self.max_position)
                .build();
            oracle.set_price(asset.price_feed(), self.collateral_price, FEED_DECIMALS);
            asset
        };

        let mut registry = AssetRegistry::new();
        registry.register(settlement.clone()).unwrap();
        if !self.settlement_collateral {
            registry.register(asset.clone()).unwrap();
        }

        let mut exchange = MockExchange::new(oracle.clone());
        exchange.add_market(market, self.fee_ppm);
        exchange.add_token(
            settlement.token(),
            settlement.decimals(),
            Some(settlement.price_feed()),
        );
        exchange.add_token(asset.token(), asset.decimals(), Some(asset.price_feed()));

        let account = named_address("account:perp-lemma");
        let owner = named_address("owner");
        let usd_lemma = named_address("usd-lemma");
        let rebalancer = named_address("rebalancer");
        let config = LemmaConfig::new(
            account,
            owner,
            usd_lemma,
            asset.token(),
            settlement.token(),
            settlement.decimals(),
        )
        .unwrap()
        .with_rebalancer(rebalancer)
        .with_side(self.side);

        let lemma = PerpLemma::new(config, registry, exchange, oracle.clone()).unwrap();
        TestLemma {
            lemma,
            oracle,
            asset,
            settlement,
            market,
            account,
            owner,
            usd_lemma,
            rebalancer,
        }
    }
}

/// Wrapper under test together with its participants.
#[derive(Debug)]
pub struct TestLemma {
    pub lemma: PerpLemma<MockExchange, MockOracle>,
    pub oracle: MockOracle,
    pub asset: CollateralAsset,
    pub settlement: CollateralAsset,
    pub market: Address,
    pub account: Address,
    pub owner: Address,
    pub usd_lemma: Address,
    pub rebalancer: Address,
}

impl TestLemma {
    pub fn exchange(&mut self) -> &mut MockExchange {
        self.lemma.exchange_mut()
    }

    /// Hands `amount` of collateral to the wrapper.
    pub fn fund(&mut self, amount: U256) {
        self.lemma.transfer_in(self.asset.token(), amount).unwrap();
    }

    /// Funds and opens with exactly `collateral`.
    pub fn open(&mut self, collateral: U256) -> PositionChanged {
        self.fund(collateral);
        self.lemma
            .open_w_exact_collateral(self.usd_lemma, collateral)
            .unwrap()
    }

    pub fn close(&mut self, collateral: U256) -> CloseOutcome {
        self.lemma
            .close_w_exact_collateral(self.usd_lemma, collateral)
            .unwrap()
    }

    pub fn size(&self) -> I256 {
        self.lemma.size().unwrap()
    }

    /// Collateral a full close returns at current prices.
    pub fn closeable(&self) -> U256 {
        let held = self.lemma.config().side().held(self.size());
        self.lemma
            .collateral_amount_given_underlying_asset_amount(held, false)
            .unwrap()
    }
}
