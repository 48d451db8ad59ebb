//! Ledger facade
//!
//! Wires the wallet repository, transfer engine, history reader and seeder
//! over one shared store handle, and adds logging and metrics around them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_ledger::{Config, Ledger, MemoryStore};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(MemoryStore::new(config.locking.lock_timeout()));
//!     let ledger = Ledger::new(store, config)?;
//!
//!     let alice = ledger.create_wallet(Decimal::from(100)).await?;
//!     let bob = ledger.create_wallet(Decimal::ZERO).await?;
//!     ledger.transfer(&alice, &bob, Decimal::from(30)).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    history::TransactionReader,
    metrics::Metrics,
    seed::{SeedOutcome, WalletSeeder},
    store::LedgerStore,
    transfer::TransferEngine,
    types::{self, Address, Transaction, Wallet},
    wallet::WalletRepository,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Main ledger interface
pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    wallets: WalletRepository<S>,
    engine: TransferEngine<S>,
    history: TransactionReader<S>,
    metrics: Metrics,
    config: Config,
}

impl<S: LedgerStore> Ledger<S> {
    /// Build a ledger over an explicitly opened store
    pub fn new(store: Arc<S>, config: Config) -> Result<Self> {
        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            wallets: WalletRepository::new(store.clone()),
            engine: TransferEngine::new(store.clone()),
            history: TransactionReader::new(store.clone()),
            store,
            metrics,
            config,
        })
    }

    /// Create a wallet with a fresh address
    pub async fn create_wallet(&self, starting_balance: Decimal) -> Result<Address> {
        match self.wallets.create_wallet(starting_balance).await {
            Ok(address) => {
                self.metrics.record_wallet_created();
                Ok(address)
            }
            Err(e) => {
                log_failure("create_wallet", &e);
                Err(e)
            }
        }
    }

    /// Current balance of a wallet
    pub async fn get_balance(&self, address: &Address) -> Result<Decimal> {
        self.wallets.get_balance(address).await
    }

    /// Wallet row by address
    pub async fn get_wallet(&self, address: &Address) -> Result<Wallet> {
        self.wallets.get_wallet(address).await
    }

    /// Move `amount` from one wallet to another
    pub async fn transfer(&self, from: &Address, to: &Address, amount: Decimal) -> Result<Transaction> {
        let start = Instant::now();

        match self.engine.transfer(from, to, amount).await {
            Ok(tx) => {
                self.metrics.record_transfer(start.elapsed().as_secs_f64());
                debug!(
                    id = tx.id,
                    from = %tx.from,
                    to = %tx.to,
                    amount = %tx.amount,
                    "Transfer committed"
                );
                Ok(tx)
            }
            Err(e) => {
                self.metrics.record_transfer_rejected(e.label());
                log_failure("transfer", &e);
                Err(e)
            }
        }
    }

    /// The `n` most recent transactions, newest first
    pub async fn last_n_transactions(&self, n: i64) -> Result<Vec<Transaction>> {
        let n = usize::try_from(n).map_err(|_| Error::InvalidCount(n))?;
        self.history.last_n(n).await
    }

    /// Seed wallets per `config.seeding`, bounded by its deadline
    pub async fn seed_wallets(&self) -> Result<SeedOutcome> {
        let seeding = &self.config.seeding;
        let cancel = CancellationToken::new();

        let deadline = seeding.deadline();
        let timer = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(deadline).await;
                warn!(deadline_ms = deadline.as_millis() as u64, "Seeding deadline reached");
                cancel.cancel();
            }
        });

        let seeder = WalletSeeder::new(self.wallets.clone());
        let result = seeder
            .seed(seeding.wallet_count, seeding.starting_balance, &cancel)
            .await;
        timer.abort();

        match result {
            Ok(outcome) => {
                if let SeedOutcome::Created { created } = outcome {
                    self.metrics.wallets_created.inc_by(created as u64);
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Seeding failed");
                Err(e)
            }
        }
    }

    /// Number of wallets
    pub async fn wallet_count(&self) -> Result<u64> {
        self.wallets.count_wallets().await
    }

    /// Sum of every wallet balance over a consistent snapshot
    pub async fn total_balance(&self) -> Result<Decimal> {
        let wallets = self.store.all_wallets().await?;
        wallets.iter().try_fold(Decimal::ZERO, |total, wallet| {
            total
                .checked_add(wallet.balance)
                .and_then(types::to_money_scale)
                .ok_or_else(|| {
                    Error::InvariantViolation("Total balance exceeds ledger precision".to_string())
                })
        })
    }

    /// Prometheus collectors
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared store handle
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

fn log_failure(operation: &'static str, err: &Error) {
    match err.kind() {
        ErrorKind::Infrastructure => error!(operation, error = %err, "Operation failed"),
        _ => warn!(operation, error = %err, "Operation rejected"),
    }
}

impl<S: LedgerStore> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("service_name", &self.config.service_name)
            .field("metrics", &self.metrics)
            .finish()
    }
}
