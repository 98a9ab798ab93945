//! On-chain interfaces used by the rebalancer bot.

#[allow(clippy::too_many_arguments)]
pub mod lemma {
    alloy::sol!(
        /// Perpetual exchange wrapper of the synthetic dollar.
        #[derive(Debug)]
        #[sol(rpc)]
        interface IPerpLemma {
            function getFundingPNL() external view returns (int256);
            function realizedFundingPNL() external view returns (int256);
            function reBalancer() external view returns (address);
        }
    );

    alloy::sol!(
        /// Synthetic dollar, entry point of every wrapper operation.
        #[derive(Debug)]
        #[sol(rpc)]
        interface IUSDLemma {
            function reBalance(uint256 perpetualDEXIndex, address collateral, int256 amount, bytes calldata data) external returns (bool);
            function perpetualDEXWrappers(uint256 perpetualDEXIndex, address collateral) external view returns (address);
        }
    );

    alloy::sol!(
        /// Execution bounds of a rebalance trade, passed as `data`.
        #[derive(Debug)]
        struct RebalanceData {
            uint160 sqrtPriceLimitX96;
            uint256 deadline;
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod exchange {
    alloy::sol!(
        /// Market registry of the perpetual exchange.
        #[derive(Debug)]
        #[sol(rpc)]
        interface IMarketRegistry {
            function getFeeRatio(address baseToken) external view returns (uint24);
        }
    );
}
