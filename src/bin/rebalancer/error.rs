//! Error types for the funding rebalancer.

use perp_lemma::error::LemmaError;

use crate::config::ConfigError;

/// Main error type for the funding rebalancer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment configuration error: {0}")]
    EnvConfig(#[from] envy::Error),

    #[error("Alloy contract error: {0}")]
    AlloyContract(#[from] alloy::contract::Error),

    #[error("Alloy signer error: {0}")]
    AlloySigner(#[from] alloy::signers::local::LocalSignerError),

    #[error("Alloy pending transaction error: {0}")]
    AlloyPendingTransaction(#[from] alloy::providers::PendingTransactionError),

    #[error("Lemma error: {0}")]
    Lemma(#[from] LemmaError),

    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(#[from] url::ParseError),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] alloy::primitives::hex::FromHexError),

    #[error("Wrapper {wrapper} is not registered at the USDLemma, found {found}")]
    WrapperMismatch {
        wrapper: alloy::primitives::Address,
        found: alloy::primitives::Address,
    },

    #[error("Rebalance transaction reverted")]
    Reverted,
}

pub type Result<T> = std::result::Result<T, Error>;
