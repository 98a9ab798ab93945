//! Configuration for the funding rebalancer.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): connection details, keys, contracts
//! - CLI arguments: strategy parameters

use std::time::Duration;

use alloy::primitives::Address;
use clap::Parser;
use fastnum::{UD128, decimal::Context};
use perp_lemma::{Deployment, num::Converter, rebalance::RebalanceConfig};

/// Environment configuration (connection details, credentials, contracts).
#[derive(Debug, serde::Deserialize)]
pub struct EnvConfig {
    /// Chain ID (e.g., 10 for Optimism)
    pub chain_id: u64,

    /// RPC URL for the node
    pub node_rpc_url: String,

    /// Private key of the rebalancer account
    pub private_key: String,

    /// USDLemma contract address
    pub usd_lemma_address: String,

    /// Perpetual exchange wrapper address
    pub perp_lemma_address: String,

    /// Index of the perpetual exchange at the USDLemma
    pub perpetual_dex_index: u64,

    /// Settlement token address
    pub settlement_token_address: String,

    /// Collateral token backed by the wrapper
    pub collateral_address: String,

    /// Base token of the hedged market
    pub base_token_address: String,

    /// Market registry of the exchange
    pub market_registry_address: String,

    /// Optional timeout for operations (default: 30s)
    pub timeout_seconds: Option<u64>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Parse all contract addresses into a deployment.
    pub fn deployment(&self) -> Result<Deployment, alloy::primitives::hex::FromHexError> {
        Ok(Deployment::custom(
            self.chain_id,
            self.usd_lemma_address.parse::<Address>()?,
            self.perp_lemma_address.parse()?,
            self.perpetual_dex_index,
            self.settlement_token_address.parse()?,
            self.collateral_address.parse()?,
            self.base_token_address.parse()?,
            self.market_registry_address.parse()?,
        ))
    }
}

/// CLI arguments for the rebalance strategy.
#[derive(Debug, Parser)]
#[command(name = "rebalancer")]
#[command(about = "Realizes accrued funding PnL of a perpetual exchange wrapper")]
pub struct CliConfig {
    /// Smallest unrealized funding PnL worth a trade, in quote (e.g., 10.5)
    #[arg(long, default_value = "0")]
    pub min_rebalance_amount: String,

    /// Seconds between evaluations
    #[arg(long, default_value_t = 50)]
    pub poll_interval_secs: u64,

    /// Validity of a rebalance trade in seconds
    #[arg(long, default_value_t = 120)]
    pub deadline_secs: u64,

    /// Only log decisions, send no transactions
    #[arg(long)]
    pub dry_run: bool,
}

impl CliConfig {
    /// Convert CLI config to the pure RebalanceConfig used by the strategy.
    pub fn to_rebalance_config(&self) -> Result<RebalanceConfig, ConfigError> {
        let min_amount = UD128::from_str(&self.min_rebalance_amount, Context::default())
            .map_err(|_| ConfigError::InvalidMinAmount(self.min_rebalance_amount.clone()))?;

        if self.deadline_secs == 0 {
            return Err(ConfigError::ZeroDeadline);
        }

        Ok(RebalanceConfig {
            min_amount: Converter::canonical().to_unsigned(min_amount),
            deadline_offset: self.deadline_secs,
        })
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(Duration::from_secs(self.poll_interval_secs))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid minimum rebalance amount: {0}")]
    InvalidMinAmount(String),

    #[error("deadline_secs cannot be zero")]
    ZeroDeadline,

    #[error("poll_interval_secs cannot be zero")]
    ZeroPollInterval,
}
