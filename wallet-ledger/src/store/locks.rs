//! Per-address exclusive row locks
//!
//! Each address maps to an async mutex that a unit of work holds until it
//! commits or rolls back. Entries are created on demand and removed as soon
//! as nobody holds or waits on them, so probing unknown addresses leaves no
//! residue behind.

use crate::{
    error::{Error, Result},
    types::Address,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type RowMutex = Arc<Mutex<()>>;

/// Shared table of row locks
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    rows: Arc<DashMap<Address, RowMutex>>,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock on `address`, waiting at most `timeout`.
    ///
    /// Cancel-safe: dropping the future while waiting leaves no lock held.
    pub async fn acquire(&self, address: &Address, timeout: Duration) -> Result<RowLock> {
        // The shard guard must not live across the await below
        let mutex = self.rows.entry(address.clone()).or_default().clone();

        let mut lock = RowLock {
            address: address.clone(),
            rows: self.rows.clone(),
            guard: None,
        };

        // `lock` is constructed first so that a timeout or cancellation still
        // runs the cleanup in `Drop`
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                lock.guard = Some(guard);
                Ok(lock)
            }
            Err(_) => {
                tracing::warn!(address = %address, ?timeout, "Row lock timed out");
                Err(Error::LockTimeout(address.clone()))
            }
        }
    }

    /// Number of addresses currently locked or waited on
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no address is locked or waited on
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Held row lock, released on drop
#[derive(Debug)]
pub struct RowLock {
    address: Address,
    rows: Arc<DashMap<Address, RowMutex>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RowLock {
    /// Locked address
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Drop for RowLock {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits on it.
        // Clones are made under the shard lock, which `remove_if` also takes.
        self.rows
            .remove_if(&self.address, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let table = LockTable::new();
        let address = Address::new("a1");

        let lock = table.acquire(&address, TIMEOUT).await.unwrap();
        assert_eq!(lock.address(), &address);
        assert_eq!(table.len(), 1);

        drop(lock);
        assert!(table.is_empty());

        // Re-acquirable after release
        let _again = table.acquire(&address, TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let table = LockTable::new();
        let address = Address::new("b2");

        let _held = table.acquire(&address, TIMEOUT).await.unwrap();
        let result = table.acquire(&address, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::LockTimeout(a)) if a == address));

        // The timed out waiter left no extra entry behind
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let table = LockTable::new();
        let address = Address::new("c3");

        let held = table.acquire(&address, TIMEOUT).await.unwrap();

        let waiter_table = table.clone();
        let waiter_address = address.clone();
        let waiter = tokio::spawn(async move {
            waiter_table
                .acquire(&waiter_address, TIMEOUT)
                .await
                .map(|lock| lock.address().clone())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), address);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_addresses_do_not_block() {
        let table = LockTable::new();
        let _a = table.acquire(&Address::new("a"), TIMEOUT).await.unwrap();
        let _b = table
            .acquire(&Address::new("b"), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(table.len(), 2);
    }
}
