//! Bulk wallet initializer
//!
//! Provisions a fixed number of wallets on an empty ledger. Creations run as
//! independent tasks that report back over a channel; a single collector
//! counts outcomes, so no counter is shared between tasks.

use crate::{
    error::{Error, Result},
    store::LedgerStore,
    types::Address,
    wallet::WalletRepository,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a seeding pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Ledger already held wallets; nothing created
    Skipped {
        /// Wallets present before the pass
        existing: u64,
    },
    /// Every requested wallet was created
    Created {
        /// Wallets created by this pass
        created: usize,
    },
}

/// Concurrent, idempotent wallet provisioning
pub struct WalletSeeder<S> {
    wallets: WalletRepository<S>,
}

impl<S: LedgerStore> WalletSeeder<S> {
    /// Create seeder over a wallet repository
    pub fn new(wallets: WalletRepository<S>) -> Self {
        Self { wallets }
    }

    /// Create `count` wallets holding `balance` each, unless any wallet exists.
    ///
    /// Cancelling `cancel` abandons in-flight creations; every launched task
    /// still reports, and the abandoned ones count as failures. Wallets that
    /// were created before a failure are kept.
    pub async fn seed(
        &self,
        count: usize,
        balance: Decimal,
        cancel: &CancellationToken,
    ) -> Result<SeedOutcome> {
        let existing = self.wallets.count_wallets().await?;
        if existing > 0 {
            info!(existing, "Ledger already has wallets, skipping seeding");
            return Ok(SeedOutcome::Skipped { existing });
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Address>>();
        for _ in 0..count {
            let wallets = self.wallets.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = wallets.create_wallet(balance) => result,
                };
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut created = 0usize;
        let mut failed = 0usize;
        while let Some(result) = rx.recv().await {
            match result {
                Ok(_) => created += 1,
                Err(e) => {
                    warn!(error = %e, "Wallet creation failed during seeding");
                    failed += 1;
                }
            }
        }

        info!("{}/{} wallets successfully created", created, count);

        // A task that panicked drops its sender without reporting
        let unreported = count - created - failed;
        if failed + unreported > 0 {
            return Err(Error::Seeding {
                failed: failed + unreported,
                total: count,
            });
        }
        Ok(SeedOutcome::Created { created })
    }
}
