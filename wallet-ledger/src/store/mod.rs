//! Ledger store capability
//!
//! The engine is written against [`LedgerStore`] and [`UnitOfWork`] so that
//! the transfer protocol does not depend on any storage engine's locking
//! syntax. A unit of work stages writes locally and applies them in a single
//! atomic step on [`UnitOfWork::commit`]; dropping it without committing is a
//! rollback. Row locks are held from [`UnitOfWork::lock_for_update`] until the
//! unit of work ends.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process state behind a read/write lock
//! - `RocksStore` - RocksDB column families, `WriteBatch` commits
//!   (feature `rocksdb`)

mod locks;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use locks::{LockTable, RowLock};
pub use memory::{MemoryStore, MemoryUnitOfWork};
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksStore, RocksUnitOfWork};

use crate::{
    error::Result,
    types::{Address, Transaction, Wallet},
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Durable keyed storage for wallets and transactions
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Unit of work type produced by [`LedgerStore::begin`]
    type Unit: UnitOfWork;

    /// Start an atomic unit of work
    async fn begin(&self) -> Result<Self::Unit>;

    /// Committed point read, no lock taken
    async fn find_wallet(&self, address: &Address) -> Result<Option<Wallet>>;

    /// Number of wallets
    async fn count_wallets(&self) -> Result<u64>;

    /// Consistent snapshot of every committed wallet
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;

    /// Number of committed transactions
    async fn count_transactions(&self) -> Result<u64>;

    /// Most recent transactions, newest first, at most `limit`
    async fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>>;
}

/// Atomic unit of work with exclusive row locks
#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquire the exclusive lock for `address` and read the row.
    ///
    /// The lock is taken whether or not the row exists, so a
    /// check-then-insert on the same address is serialized. Locking an
    /// address this unit already holds returns its current view.
    async fn lock_for_update(&mut self, address: &Address) -> Result<Option<Wallet>>;

    /// Stage a wallet insert. The address must be locked by this unit.
    fn insert_wallet(&mut self, wallet: Wallet) -> Result<()>;

    /// Stage a balance update. The address must be locked by this unit.
    fn update_balance(&mut self, address: &Address, balance: Decimal) -> Result<()>;

    /// Stage a transfer record
    fn append_transaction(&mut self, from: &Address, to: &Address, amount: Decimal) -> Result<()>;

    /// Apply every staged write atomically and release the locks.
    ///
    /// Returns the transaction records as committed, with their sequence
    /// numbers and commit timestamps.
    async fn commit(self) -> Result<Vec<Transaction>>;

    /// Discard staged writes and release the locks
    fn rollback(self);
}
