//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - Wallet rows (key: address bytes)
//! - `transactions` - Append-only transfer log (key: id as big-endian u64)
//!
//! Big-endian ids make reverse iteration yield the newest records first.
//! Commits go through one `WriteBatch` each and are serialized by a commit
//! mutex, so ids are assigned in commit order and readers always see a
//! prefix of the log.

use super::{LedgerStore, LockTable, RowLock, UnitOfWork};
use crate::{
    error::{Error, Result},
    types::{self, Address, NewTransaction, Transaction, Wallet},
    Config,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Column family names
const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";

struct Inner {
    db: DB,
    /// Next transaction id; guarded so that id assignment and the batch
    /// write happen as one step
    commit: Mutex<u64>,
}

/// RocksDB-backed ledger store
#[derive(Clone)]
pub struct RocksStore {
    inner: Arc<Inner>,
    locks: LockTable,
    lock_timeout: Duration,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.inner.db.path())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        let tuning = &config.storage.rocksdb;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
        db_opts.set_target_file_size_base(tuning.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(tuning.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            tuning.level0_file_num_compaction_trigger,
        );
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if tuning.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_wallets()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_id = {
            let cf = db
                .cf_handle(CF_TRANSACTIONS)
                .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_TRANSACTIONS)))?;
            match db.iterator_cf(cf, IteratorMode::End).next() {
                Some(item) => {
                    let (key, _) = item?;
                    decode_id(&key)? + 1
                }
                None => 1,
            }
        };

        tracing::info!(path = ?path, next_transaction_id = next_id, "Opened RocksDB ledger store");

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                commit: Mutex::new(next_id),
            }),
            locks: LockTable::new(),
            lock_timeout: config.locking.lock_timeout(),
        })
    }

    // Column family options

    fn cf_options_wallets() -> Options {
        let mut opts = Options::default();
        // Wallet rows are read on every transfer, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    /// Row lock table, exposed for inspection
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }
}

impl Inner {
    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get_wallet(&self, address: &Address) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        match self.db.get_cf(cf, address.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }
}

fn decode_id(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::Storage(format!("Malformed transaction key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[async_trait]
impl LedgerStore for RocksStore {
    type Unit = RocksUnitOfWork;

    async fn begin(&self) -> Result<RocksUnitOfWork> {
        Ok(RocksUnitOfWork {
            inner: self.inner.clone(),
            locks: self.locks.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            inserts: Vec::new(),
            updates: HashMap::new(),
            transactions: Vec::new(),
        })
    }

    async fn find_wallet(&self, address: &Address) -> Result<Option<Wallet>> {
        self.inner.get_wallet(address)
    }

    async fn count_wallets(&self) -> Result<u64> {
        let cf = self.inner.cf_handle(CF_WALLETS)?;
        let mut count = 0u64;
        for item in self.inner.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        // Hold off commits so the scan sees one consistent state
        let _commit = self.inner.commit.lock();
        let cf = self.inner.cf_handle(CF_WALLETS)?;
        let mut wallets = Vec::new();
        for item in self.inner.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            wallets.push(bincode::deserialize(&value)?);
        }
        Ok(wallets)
    }

    async fn count_transactions(&self) -> Result<u64> {
        Ok(*self.inner.commit.lock() - 1)
    }

    async fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let cf = self.inner.cf_handle(CF_TRANSACTIONS)?;
        let mut transactions = Vec::with_capacity(limit.min(1024));
        for item in self.inner.db.iterator_cf(cf, IteratorMode::End).take(limit) {
            let (_, value) = item?;
            transactions.push(bincode::deserialize(&value)?);
        }
        Ok(transactions)
    }
}

/// Unit of work over a [`RocksStore`]
pub struct RocksUnitOfWork {
    inner: Arc<Inner>,
    locks: LockTable,
    lock_timeout: Duration,
    held: HashMap<Address, RowLock>,
    inserts: Vec<Wallet>,
    updates: HashMap<Address, Decimal>,
    transactions: Vec<NewTransaction>,
}

impl RocksUnitOfWork {
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

    fn current_view(&self, address: &Address) -> Result<Option<Wallet>> {
        let staged = self.inserts.iter().find(|w| &w.address == address).cloned();
        let mut wallet = match staged {
            Some(wallet) => wallet,
            None => match self.inner.get_wallet(address)? {
                Some(wallet) => wallet,
                None => return Ok(None),
            },
        };

        if let Some(balance) = self.updates.get(address) {
            wallet.balance = *balance;
        }
        Ok(Some(wallet))
    }
}

#[async_trait]
impl UnitOfWork for RocksUnitOfWork {
    async fn lock_for_update(&mut self, address: &Address) -> Result<Option<Wallet>> {
        if !self.held.contains_key(address) {
            let lock = self.locks.acquire(address, self.lock_timeout).await?;
            self.held.insert(address.clone(), lock);
        }
        self.current_view(address)
    }

    fn insert_wallet(&mut self, wallet: Wallet) -> Result<()> {
        self.ensure_locked(&wallet.address)?;
        if self.current_view(&wallet.address)?.is_some() {
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
        let now = Utc::now();
        let cf_wallets = self.inner.cf_handle(CF_WALLETS)?;
        let cf_transactions = self.inner.cf_handle(CF_TRANSACTIONS)?;
        let mut batch = WriteBatch::default();

        for wallet in &self.inserts {
            batch.put_cf(cf_wallets, wallet.address.as_bytes(), bincode::serialize(wallet)?);
        }

        for (address, balance) in &self.updates {
            // Row is locked by this unit, so the stored value cannot move under us
            let mut wallet = self.current_view(address)?.ok_or_else(|| {
                Error::InvariantViolation(format!("Balance update for missing wallet {}", address))
            })?;
            wallet.balance = *balance;
            wallet.updated_at = now;
            batch.put_cf(cf_wallets, address.as_bytes(), bincode::serialize(&wallet)?);
        }

        let mut next_id = self.inner.commit.lock();
        let mut committed = Vec::with_capacity(self.transactions.len());
        for (offset, record) in self.transactions.iter().enumerate() {
            let transaction = record.clone().into_committed(*next_id + offset as u64, now);
            batch.put_cf(
                cf_transactions,
                transaction.id.to_be_bytes(),
                bincode::serialize(&transaction)?,
            );
            committed.push(transaction);
        }

        // Atomic commit
        self.inner.db.write(batch)?;
        *next_id += committed.len() as u64;
        drop(next_id);

        tracing::debug!(
            wallets = self.inserts.len() + self.updates.len(),
            transactions = committed.len(),
            "RocksDB batch committed"
        );

        Ok(committed)
    }

    fn rollback(self) {
        tracing::debug!(locked_rows = self.held.len(), "Unit of work rolled back");
    }
}
