use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use fastnum::{UD128, decimal::Context};
use itertools::Itertools;

use crate::{
    error::{LemmaError, Result},
    num::Converter,
};

/// Supported collateral token.
///
/// Precision and market are fixed at registration; amounts of this token are
/// interpreted at `decimals` until converted to canonical fixed point.
#[derive(Clone, derive_more::Debug, PartialEq, Eq)]
pub struct CollateralAsset {
    symbol: String,
    token: Address,
    decimals: u8,
    market: Address,
    #[debug("{}", Converter::canonical().from_unsigned::<4>(*max_position))]
    max_position: U256,
    price_feed: Address,
}

impl CollateralAsset {
    pub fn new(
        symbol: impl Into<String>,
        token: Address,
        decimals: u8,
        market: Address,
        max_position: U256,
        price_feed: Address,
    ) -> Result<Self> {
        if token.is_zero() {
            return Err(LemmaError::ZeroAddress("collateral token"));
        }
        if market.is_zero() {
            return Err(LemmaError::ZeroAddress("market"));
        }
        if price_feed.is_zero() {
            return Err(LemmaError::ZeroAddress("price feed"));
        }
        if decimals > 36 {
            return Err(LemmaError::InvalidConfig(format!(
                "unsupported token precision: {decimals}"
            )));
        }
        Ok(Self {
            symbol: symbol.into(),
            token,
            decimals,
            market,
            max_position,
            price_feed,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Token contract of the collateral.
    pub fn token(&self) -> Address {
        self.token
    }

    /// Native precision of the token.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Base-asset market the collateral backs.
    pub fn market(&self) -> Address {
        self.market
    }

    /// Ceiling on the absolute position size, canonical base units.
    pub fn max_position(&self) -> U256 {
        self.max_position
    }

    /// Feed quoting the collateral in the settlement unit of account.
    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    pub fn converter(&self) -> Converter {
        Converter::new(self.decimals)
    }
}

/// Per-collateral deployment parameters as found in the JSON configuration.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub token: String,
    pub decimals: u8,
    pub market: String,
    /// Human readable, e.g. `"90"` or `"12.5"`.
    pub max_position: String,
    pub price_feed: String,
}

impl AssetConfig {
    pub fn to_asset(&self) -> Result<CollateralAsset> {
        let max_position = UD128::from_str(&self.max_position, Context::default())
            .map_err(|_| {
                LemmaError::InvalidConfig(format!(
                    "{}: invalid max position {:?}",
                    self.symbol, self.max_position
                ))
            })?;
        CollateralAsset::new(
            self.symbol.clone(),
            parse_address(&self.symbol, "token", &self.token)?,
            self.decimals,
            parse_address(&self.symbol, "market", &self.market)?,
            Converter::canonical().to_unsigned(max_position),
            parse_address(&self.symbol, "price_feed", &self.price_feed)?,
        )
    }
}

/// Collateral assets known to a wrapper instance, keyed by token.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistry {
    assets: HashMap<Address, CollateralAsset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of [`AssetConfig`]s.
    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Vec<AssetConfig> = serde_json::from_str(json)
            .map_err(|e| LemmaError::InvalidConfig(format!("asset config: {e}")))?;

        if let Some(dup) = configs.iter().map(|c| c.token.to_lowercase()).duplicates().next() {
            return Err(LemmaError::InvalidConfig(format!(
                "collateral {dup} listed twice"
            )));
        }

        let mut registry = Self::new();
        for config in &configs {
            registry.register(config.to_asset()?)?;
        }
        Ok(registry)
    }

    /// Adds an asset. Registered assets can not be replaced.
    pub fn register(&mut self, asset: CollateralAsset) -> Result<()> {
        if self.assets.contains_key(&asset.token) {
            return Err(LemmaError::InvalidConfig(format!(
                "collateral {} already registered",
                asset.token
            )));
        }
        self.assets.insert(asset.token, asset);
        Ok(())
    }

    pub fn get(&self, token: Address) -> Result<&CollateralAsset> {
        self.assets
            .get(&token)
            .ok_or(LemmaError::InvalidAsset(token))
    }

    pub fn contains(&self, token: Address) -> bool {
        self.assets.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        self.assets.values().map(|a| a.symbol()).sorted().collect()
    }

    pub(crate) fn set_max_position(&mut self, token: Address, max_position: U256) -> Result<()> {
        let asset = self
            .assets
            .get_mut(&token)
            .ok_or(LemmaError::InvalidAsset(token))?;
        asset.max_position = max_position;
        Ok(())
    }
}

fn parse_address(symbol: &str, field: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| LemmaError::InvalidConfig(format!("{symbol}: invalid {field}: {e}")))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const CONFIG: &str = r#"[
        {
            "symbol": "WETH",
            "token": "0x00000000000000000000000000000000000000a1",
            "decimals": 18,
            "market": "0x00000000000000000000000000000000000000e1",
            "max_position": "90",
            "price_feed": "0x00000000000000000000000000000000000000f1"
        },
        {
            "symbol": "WBTC",
            "token": "0x00000000000000000000000000000000000000a2",
            "decimals": 8,
            "market": "0x00000000000000000000000000000000000000e2",
            "max_position": "2.5",
            "price_feed": "0x00000000000000000000000000000000000000f2"
        }
    ]"#;

    #[test]
    fn test_registry_from_json() {
        let registry = AssetRegistry::from_json(CONFIG).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.symbols(), vec!["WBTC", "WETH"]);

        let weth = registry
            .get(address!("0x00000000000000000000000000000000000000a1"))
            .unwrap();
        assert_eq!(weth.decimals(), 18);
        assert_eq!(
            weth.max_position(),
            U256::from(90_000_000_000_000_000_000u128)
        );

        let wbtc = registry
            .get(address!("0x00000000000000000000000000000000000000a2"))
            .unwrap();
        assert_eq!(
            wbtc.max_position(),
            U256::from(2_500_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let config = format!(
            "[{0}, {0}]",
            r#"{"symbol": "USDC", "token": "0x00000000000000000000000000000000000000a3",
                "decimals": 6, "market": "0x00000000000000000000000000000000000000e1",
                "max_position": "1", "price_feed": "0x00000000000000000000000000000000000000f3"}"#
        );
        assert!(matches!(
            AssetRegistry::from_json(&config),
            Err(LemmaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_asset() {
        let registry = AssetRegistry::from_json(CONFIG).unwrap();
        let unknown = address!("0x00000000000000000000000000000000000000ff");
        assert_eq!(registry.get(unknown), Err(LemmaError::InvalidAsset(unknown)));
    }

    #[test]
    fn test_zero_address_rejected() {
        let res = CollateralAsset::new(
            "USDC",
            Address::ZERO,
            6,
            address!("0x00000000000000000000000000000000000000e1"),
            U256::ZERO,
            address!("0x00000000000000000000000000000000000000f3"),
        );
        assert_eq!(res, Err(LemmaError::ZeroAddress("collateral token")));
    }

    #[test]
    fn test_uncapped_asset_debug() {
        let asset = CollateralAsset::new(
            "WETH",
            address!("0x00000000000000000000000000000000000000a1"),
            18,
            address!("0x00000000000000000000000000000000000000e1"),
            U256::MAX,
            address!("0x00000000000000000000000000000000000000f1"),
        )
        .unwrap();
        assert!(format!("{asset:?}").contains("WETH"));
    }
}
