//! Alsania Ledger - chain orchestration
//!
//! This crate ties the pieces together:
//! - The canonical chain, validated and appended under one lock
//! - Consensus rounds driven to confirmation from a vote channel
//! - A periodic round driver for running nodes
//! - The in-memory balance book and stake-weighted reward hook

pub mod balances;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod rewards;

#[cfg(test)]
mod tests;

pub use balances::BalanceBook;
pub use driver::{DriverConfig, RoundDriver};
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerConfig, LocalValidator};
pub use rewards::StakeRewards;
