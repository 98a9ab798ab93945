//! Wrapper state.
//!
//! [`PerpLemma`] holds the exchange position backing one collateral asset and
//! the bookkeeping the exchange does not keep for it: collateral custody,
//! settlement token balance, the [`FundingLedger`] and the emergency
//! settlement pool. Position size, vault balances and pending funding are
//! never cached; every read goes to the [`crate::exchange::PerpExchange`].

mod config;
mod funding;
mod lemma;
mod leverage;

pub use config::*;
pub use funding::*;
pub use lemma::*;
pub use leverage::*;
