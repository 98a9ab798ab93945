//! Funding rebalancer for the synthetic dollar's perpetual wrappers.
//!
//! This binary polls a wrapper's funding PnL and trades the unrealized part
//! back into the position through the USDLemma.

mod bot;
mod config;
mod error;

use std::{process::exit, time::Duration};

use alloy::{network::EthereumWallet, signers::local::PrivateKeySigner};
use clap::Parser;
use tracing::error;
use url::Url;

use bot::RebalancerBot;
use config::{CliConfig, EnvConfig};

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    let cli_config = CliConfig::parse();

    let (rebalance_config, poll_interval) =
        match cli_config.to_rebalance_config().and_then(|c| Ok((c, cli_config.poll_interval()?))) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid configuration: {}", e);
                exit(1);
            }
        };

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let deployment = match env_config.deployment() {
        Ok(deployment) => deployment,
        Err(e) => {
            eprintln!("Invalid contract address: {}", e);
            exit(1);
        }
    };

    let private_key: PrivateKeySigner = match env_config.private_key.parse() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Invalid private key: {}", e);
            exit(1);
        }
    };

    let wallet = EthereumWallet::new(private_key);

    let node_url = match Url::parse(&env_config.node_rpc_url) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Invalid RPC URL: {}", e);
            exit(1);
        }
    };

    // Default timeout is 30 seconds
    let timeout = Duration::from_secs(env_config.timeout_seconds.unwrap_or(30));

    let mut bot = match RebalancerBot::try_new(
        node_url,
        wallet,
        deployment,
        rebalance_config,
        poll_interval,
        timeout,
        cli_config.dry_run,
    ) {
        Ok(bot) => bot,
        Err(e) => {
            eprintln!("Failed to create rebalancer: {}", e);
            exit(1);
        }
    };

    if let Err(e) = bot.run().await {
        error!(%e, "Rebalancer encountered an error, shutting down");
        exit(1);
    }
}
