//! Transaction history reads

use crate::{
    error::{Error, Result},
    store::LedgerStore,
    types::Transaction,
};
use std::sync::Arc;

/// Read side of the transaction log
pub struct TransactionReader<S> {
    store: Arc<S>,
}

impl<S> Clone for TransactionReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LedgerStore> TransactionReader<S> {
    /// Create reader over a shared store handle
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The `n` most recent transactions, newest first.
    ///
    /// Fails with [`Error::NoTransactions`] only when the ledger holds no
    /// transactions at all; `n == 0` on a non-empty ledger is an empty list.
    pub async fn last_n(&self, n: usize) -> Result<Vec<Transaction>> {
        if n == 0 {
            return match self.store.count_transactions().await? {
                0 => Err(Error::NoTransactions),
                _ => Ok(Vec::new()),
            };
        }

        let transactions = self.store.list_transactions(n).await?;
        if transactions.is_empty() {
            return Err(Error::NoTransactions);
        }
        Ok(transactions)
    }

    /// Total number of committed transactions
    pub async fn count(&self) -> Result<u64> {
        self.store.count_transactions().await
    }
}
