//! Wallet Ledger Core
//!
//! Wallet balances and atomic transfers over a pluggable transactional store.
//!
//! # Architecture
//!
//! - **Store capability**: [`LedgerStore`] / [`UnitOfWork`] with exclusive row
//!   locks and all-or-nothing commits
//! - **Transfer engine**: locks both wallets in address order, validates,
//!   debits, credits and records in one unit of work
//! - **Seeder**: concurrent, idempotent provisioning of startup wallets
//! - **Facade**: [`Ledger`] wires it together with logging and metrics
//!
//! # Invariants
//!
//! - Money conservation: transfers never change the sum of all balances
//! - Non-negativity: no committed balance is below zero
//! - Atomicity: a transfer's debit, credit and record commit together or not at all
//! - Ordering: transaction ids increase in commit order

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod seed;
pub mod store;
pub mod transfer;
pub mod types;
pub mod wallet;

// Re-exports
pub use config::{Config, StorageBackend};
pub use error::{Error, ErrorKind, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use seed::SeedOutcome;
pub use store::{LedgerStore, MemoryStore, UnitOfWork};
#[cfg(feature = "rocksdb")]
pub use store::RocksStore;
pub use types::{Address, Transaction, Wallet, MONEY_SCALE};
