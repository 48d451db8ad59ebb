//! In-process ledger store
//!
//! Committed state lives behind a single read/write lock. A unit of work
//! reads through to committed state, stages its writes locally and applies
//! them under one write-lock critical section, so readers observe either all
//! of a commit or none of it.

use super::{LedgerStore, LockTable, RowLock, UnitOfWork};
use crate::{
    error::{Error, Result},
    types::{self, Address, NewTransaction, Transaction, Wallet},
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    wallets: HashMap<Address, Wallet>,
    /// Append-only, ascending by id
    transactions: Vec<Transaction>,
    next_transaction_id: u64,
}

/// In-memory ledger store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    locks: LockTable,
    lock_timeout: Duration,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                next_transaction_id: 1,
                ..Default::default()
            })),
            locks: LockTable::new(),
            lock_timeout,
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next commit fail with a storage error (fault injection)
    pub fn inject_commit_failure(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Row lock table, exposed for inspection
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::config::LockingConfig::default().lock_timeout())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Unit = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork> {
        Ok(MemoryUnitOfWork {
            state: self.state.clone(),
            locks: self.locks.clone(),
            lock_timeout: self.lock_timeout,
            fail_next_commit: self.fail_next_commit.clone(),
            held: HashMap::new(),
            inserts: Vec::new(),
            updates: HashMap::new(),
            transactions: Vec::new(),
        })
    }

    async fn find_wallet(&self, address: &Address) -> Result<Option<Wallet>> {
        Ok(self.state.read().wallets.get(address).cloned())
    }

    async fn count_wallets(&self) -> Result<u64> {
        Ok(self.state.read().wallets.len() as u64)
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self.state.read().wallets.values().cloned().collect())
    }

    async fn count_transactions(&self) -> Result<u64> {
        Ok(self.state.read().transactions.len() as u64)
    }

    async fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let state = self.state.read();
        Ok(state.transactions.iter().rev().take(limit).cloned().collect())
    }
}

/// Unit of work over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    state: Arc<RwLock<MemoryState>>,
    locks: LockTable,
    lock_timeout: Duration,
    fail_next_commit: Arc<AtomicBool>,
    held: HashMap<Address, RowLock>,
    inserts: Vec<Wallet>,
    updates: HashMap<Address, Decimal>,
    transactions: Vec<NewTransaction>,
}

impl MemoryUnitOfWork {
    fn ensure_locked(&self, address: &Address) -> Result<()> {
        if self.held.contains_key(address) {
            Ok(())
        } else {
            Err(Error::Concurrency(format!(
                "Row {} written without holding its lock",
                address
            )))
        }
    }

    /// Row as this unit currently sees it: staged writes over committed state
    fn current_view(&self, address: &Address) -> Option<Wallet> {
        let mut wallet = self
            .inserts
            .iter()
            .find(|w| &w.address == address)
            .cloned()
            .or_else(|| self.state.read().wallets.get(address).cloned())?;

        if let Some(balance) = self.updates.get(address) {
            wallet.balance = *balance;
        }
        Some(wallet)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_for_update(&mut self, address: &Address) -> Result<Option<Wallet>> {
        if !self.held.contains_key(address) {
            let lock = self.locks.acquire(address, self.lock_timeout).await?;
            self.held.insert(address.clone(), lock);
        }
        Ok(self.current_view(address))
    }

    fn insert_wallet(&mut self, wallet: Wallet) -> Result<()> {
        self.ensure_locked(&wallet.address)?;
        if self.current_view(&wallet.address).is_some() {
            return Err(Error::WalletExists(wallet.address));
        }
        self.inserts.push(wallet);
        Ok(())
    }

    fn update_balance(&mut self, address: &Address, balance: Decimal) -> Result<()> {
        self.ensure_locked(address)?;
        if balance < Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "Negative balance {} staged for {}",
                balance, address
            )));
        }
        let balance = types::to_money_scale(balance).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "Balance {} staged for {} does not fit the ledger scale",
                balance, address
            ))
        })?;
        self.updates.insert(address.clone(), balance);
        Ok(())
    }

    fn append_transaction(&mut self, from: &Address, to: &Address, amount: Decimal) -> Result<()> {
        self.transactions.push(NewTransaction {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    async fn commit(self) -> Result<Vec<Transaction>> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::Storage("Injected commit failure".to_string()));
        }

        let mut state = self.state.write();
        let now = Utc::now();

        // Validate everything before applying anything
        for wallet in &self.inserts {
            if state.wallets.contains_key(&wallet.address) {
                return Err(Error::WalletExists(wallet.address.clone()));
            }
        }
        for address in self.updates.keys() {
            let exists = state.wallets.contains_key(address)
                || self.inserts.iter().any(|w| &w.address == address);
            if !exists {
                return Err(Error::InvariantViolation(format!(
                    "Balance update for missing wallet {}",
                    address
                )));
            }
        }

        for wallet in self.inserts {
            state.wallets.insert(wallet.address.clone(), wallet);
        }
        for (address, balance) in self.updates {
            if let Some(wallet) = state.wallets.get_mut(&address) {
                wallet.balance = balance;
                wallet.updated_at = now;
            }
        }

        let mut committed = Vec::with_capacity(self.transactions.len());
        for record in self.transactions {
            let id = state.next_transaction_id;
            state.next_transaction_id += 1;
            let transaction = record.into_committed(id, now);
            state.transactions.push(transaction.clone());
            committed.push(transaction);
        }

        drop(state);
        // Row locks are released when `self.held` drops here
        Ok(committed)
    }

    fn rollback(self) {
        tracing::debug!(
            locked_rows = self.held.len(),
            staged_writes = self.inserts.len() + self.updates.len() + self.transactions.len(),
            "Unit of work rolled back"
        );
    }
}
