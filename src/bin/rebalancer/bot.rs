//! Funding rebalancer orchestration and polling loop.
//!
//! Every tick reads the wrapper's funding PnL and the market fee, lets the
//! pure strategy decide and submits `reBalance` through the USDLemma.
//! Failures are logged and the decision is re-evaluated on the next tick
//! from fresh on-chain state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256, aliases::U160},
    providers::{DynProvider, ProviderBuilder},
    rpc::client::RpcClient,
};
use alloy_sol_types::SolValue;
use perp_lemma::{
    Deployment,
    abi::{
        exchange::IMarketRegistry::{self, IMarketRegistryInstance},
        lemma::{
            IPerpLemma::{self, IPerpLemmaInstance},
            IUSDLemma::{self, IUSDLemmaInstance},
            RebalanceData,
        },
    },
    num::FeeRatio,
    rebalance::{self, FundingSnapshot, RebalanceAction, RebalanceConfig},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Funding rebalancer bot.
#[derive(Debug)]
pub struct RebalancerBot {
    wallet_address: Address,
    deployment: Deployment,
    perp_lemma: IPerpLemmaInstance<DynProvider>,
    usd_lemma: IUSDLemmaInstance<DynProvider>,
    market_registry: IMarketRegistryInstance<DynProvider>,
    config: RebalanceConfig,
    poll_interval: Duration,
    timeout: Duration,
    dry_run: bool,
}

impl RebalancerBot {
    /// Create a new rebalancer bot.
    pub fn try_new(
        node_url: Url,
        wallet: EthereumWallet,
        deployment: Deployment,
        config: RebalanceConfig,
        poll_interval: Duration,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        let wallet_address = wallet.default_signer().address();
        info!(
            %wallet_address,
            perp_lemma = %deployment.perp_lemma(),
            collateral = %deployment.collateral(),
            min_amount = %config.min_amount,
            dry_run,
            "Initializing Funding Rebalancer"
        );

        let rpc_client = RpcClient::new_http(node_url);
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(wallet)
                .connect_client(rpc_client),
        );

        Ok(Self {
            wallet_address,
            perp_lemma: IPerpLemma::new(deployment.perp_lemma(), provider.clone()),
            usd_lemma: IUSDLemma::new(deployment.usd_lemma(), provider.clone()),
            market_registry: IMarketRegistry::new(deployment.market_registry(), provider),
            deployment,
            config,
            poll_interval,
            timeout,
            dry_run,
        })
    }

    /// Run the polling loop until a setup check fails.
    pub async fn run(&mut self) -> Result<()> {
        self.check_setup().await?;

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            debug!("Periodic evaluation triggered");
            if let Err(e) = self.evaluate_and_rebalance().await {
                match &e {
                    Error::Lemma(inner) if inner.is_retryable() => {
                        warn!(%e, "Rebalance failed, will retry")
                    }
                    _ => error!(?e, "Failed to rebalance, will retry"),
                }
            }
        }
    }

    /// Make sure the wrapper is the one the USDLemma routes to and that
    /// this wallet is its rebalancer.
    async fn check_setup(&self) -> Result<()> {
        let found = self
            .usd_lemma
            .perpetualDEXWrappers(
                U256::from(self.deployment.perpetual_dex_index()),
                self.deployment.collateral(),
            )
            .call()
            .await?;
        if found != self.deployment.perp_lemma() {
            return Err(Error::WrapperMismatch {
                wrapper: self.deployment.perp_lemma(),
                found,
            });
        }

        let rebalancer = self.perp_lemma.reBalancer().call().await?;
        if rebalancer != self.wallet_address {
            warn!(%rebalancer, wallet = %self.wallet_address, "Wallet is not the wrapper's rebalancer, transactions will revert");
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<FundingSnapshot> {
        let (funding_pnl, realized_funding_pnl, fee) = futures::try_join!(
            async { self.perp_lemma.getFundingPNL().call().await },
            async { self.perp_lemma.realizedFundingPNL().call().await },
            async {
                self.market_registry
                    .getFeeRatio(self.deployment.base_token())
                    .call()
                    .await
            },
        )?;

        Ok(FundingSnapshot {
            funding_pnl,
            realized_funding_pnl,
            fee: FeeRatio::new(fee.to::<u32>())?,
        })
    }

    /// Evaluate funding PnL and execute a rebalance if needed.
    async fn evaluate_and_rebalance(&self) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let summary = rebalance::evaluate(&snapshot, &self.config, unix_now());
        debug!(?summary, "Funding evaluation summary");

        let Some(action) = summary.action else {
            if summary.below_threshold && !summary.unrealized.is_zero() {
                debug!(unrealized = %summary.unrealized, "Unrealized funding below threshold");
            }
            return Ok(());
        };

        info!(?action, "Executing rebalance");
        if self.dry_run {
            info!("Dry run, rebalance not sent");
            return Ok(());
        }
        self.execute_rebalance(&action).await?;
        info!(amount = %action.amount, "Rebalance transaction confirmed");
        Ok(())
    }

    /// Execute a single rebalance transaction.
    async fn execute_rebalance(&self, action: &RebalanceAction) -> Result<()> {
        let data = RebalanceData {
            sqrtPriceLimitX96: U160::ZERO,
            deadline: U256::from(action.deadline),
        }
        .abi_encode();

        let pending_tx = self
            .usd_lemma
            .reBalance(
                U256::from(self.deployment.perpetual_dex_index()),
                self.deployment.collateral(),
                action.amount,
                data.into(),
            )
            .send()
            .await?;
        let receipt = pending_tx
            .with_timeout(Some(self.timeout))
            .get_receipt()
            .await?;

        debug!(?receipt, "Rebalance transaction receipt");

        if !receipt.status() {
            return Err(Error::Reverted);
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
