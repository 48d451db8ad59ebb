//! Wallet repository
//!
//! Creation goes through a locked check-then-insert: the address row lock is
//! taken before looking for an existing wallet, so two concurrent creations
//! of the same address cannot both succeed.

use crate::{
    crypto::generate_address,
    error::{Error, Result},
    store::{LedgerStore, UnitOfWork},
    types::{self, Address, Wallet},
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Access to wallet rows
pub struct WalletRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for WalletRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LedgerStore> WalletRepository<S> {
    /// Create repository over a shared store handle
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a wallet with a freshly generated address
    pub async fn create_wallet(&self, balance: Decimal) -> Result<Address> {
        self.create_wallet_at(generate_address(), balance).await
    }

    /// Create a wallet at a caller-chosen address.
    ///
    /// Fails with [`Error::WalletExists`] when the address is taken.
    pub async fn create_wallet_at(&self, address: Address, balance: Decimal) -> Result<Address> {
        let balance = types::starting_balance(balance)?;

        let mut uow = self.store.begin().await?;
        if uow.lock_for_update(&address).await?.is_some() {
            uow.rollback();
            return Err(Error::WalletExists(address));
        }

        if let Err(e) = uow.insert_wallet(Wallet::new(address.clone(), balance)) {
            uow.rollback();
            return Err(e);
        }
        uow.commit().await?;

        tracing::debug!(address = %address, balance = %balance, "Wallet created");
        Ok(address)
    }

    /// Fetch a wallet by address
    pub async fn get_wallet(&self, address: &Address) -> Result<Wallet> {
        self.store
            .find_wallet(address)
            .await?
            .ok_or_else(|| Error::WalletNotFound(address.clone()))
    }

    /// Current balance of a wallet
    pub async fn get_balance(&self, address: &Address) -> Result<Decimal> {
        Ok(self.get_wallet(address).await?.balance)
    }

    /// Total number of wallets
    pub async fn count_wallets(&self) -> Result<u64> {
        self.store.count_wallets().await
    }
}
