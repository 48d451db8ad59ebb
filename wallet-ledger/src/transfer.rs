//! Transfer engine
//!
//! Moves funds between two wallets in one atomic unit of work:
//!
//! ```text
//! validate (no store access)
//!   └─ begin
//!        ├─ lock min(from, to)      ┐ lexicographic order, independent
//!        ├─ lock max(from, to)      ┘ of transfer direction
//!        ├─ sender / receiver exist?
//!        ├─ sender.balance >= amount?
//!        ├─ debit sender, credit receiver
//!        ├─ append transaction record
//!        └─ commit (or roll back on any failure)
//! ```
//!
//! Both rows are locked before any balance is read, so no concurrent transfer
//! can drain the sender between the check and the debit. Locking in address
//! order means two transfers over the same pair always contend for the same
//! first lock, which rules out the A→B / B→A deadlock.

use crate::{
    error::{Error, Result},
    store::{LedgerStore, UnitOfWork},
    types::{self, Address, Transaction},
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Atomic debit/credit/record operation
pub struct TransferEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// Deterministic lock order for a pair of distinct addresses
pub fn lock_order<'a>(from: &'a Address, to: &'a Address) -> (&'a Address, &'a Address) {
    if from <= to {
        (from, to)
    } else {
        (to, from)
    }
}

impl<S: LedgerStore> TransferEngine<S> {
    /// Create engine over a shared store handle
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Transfer `amount` from `from` to `to`.
    ///
    /// Returns the committed transaction record. On any error neither
    /// balance nor the transaction log is changed.
    pub async fn transfer(&self, from: &Address, to: &Address, amount: Decimal) -> Result<Transaction> {
        if from == to {
            return Err(Error::SameWalletTransfer);
        }
        let amount = types::transfer_amount(amount)?;

        let mut uow = self.store.begin().await?;
        if let Err(e) = Self::apply(&mut uow, from, to, amount).await {
            uow.rollback();
            return Err(e);
        }

        let mut committed = uow.commit().await?;
        committed.pop().ok_or_else(|| {
            Error::InvariantViolation("Transfer committed without a transaction record".to_string())
        })
    }

    async fn apply(uow: &mut S::Unit, from: &Address, to: &Address, amount: Decimal) -> Result<()> {
        let (first, second) = lock_order(from, to);
        let first_row = uow.lock_for_update(first).await?;
        let second_row = uow.lock_for_update(second).await?;

        let (sender, receiver) = if first == from {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };
        let sender = sender.ok_or_else(|| Error::SenderNotFound(from.clone()))?;
        let receiver = receiver.ok_or_else(|| Error::ReceiverNotFound(to.clone()))?;

        if sender.balance < amount {
            return Err(Error::InsufficientFunds {
                address: from.clone(),
                balance: sender.balance,
                requested: amount,
            });
        }

        let sender_balance = sender.balance - amount;
        // `checked_add` drops scale before it reports overflow
        let receiver_balance = receiver
            .balance
            .checked_add(amount)
            .and_then(types::to_money_scale)
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "Crediting {} to {} exceeds ledger precision",
                    amount, to
                ))
            })?;

        uow.update_balance(from, sender_balance)?;
        uow.update_balance(to, receiver_balance)?;
        uow.append_transaction(from, to, amount)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::wallet::WalletRepository;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        wallets: WalletRepository<MemoryStore>,
        engine: TransferEngine<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(500)));
        Fixture {
            wallets: WalletRepository::new(store.clone()),
            engine: TransferEngine::new(store.clone()),
            store,
        }
    }

    #[test]
    fn test_lock_order_is_direction_independent() {
        let a = Address::new("aaaa");
        let b = Address::new("bbbb");
        assert_eq!(lock_order(&a, &b), (&a, &b));
        assert_eq!(lock_order(&b, &a), (&a, &b));
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_and_records() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100.00)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(0.00)).await.unwrap();

        let tx = f.engine.transfer(&a, &b, dec!(30.00)).await.unwrap();
        assert_eq!(tx.from, a);
        assert_eq!(tx.to, b);
        assert_eq!(tx.amount, dec!(30));

        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(70));
        assert_eq!(f.wallets.get_balance(&b).await.unwrap(), dec!(30));
        assert_eq!(f.store.count_transactions().await.unwrap(), 1);
        assert!(f.store.locks().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_funds_changes_nothing() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(70)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(30)).await.unwrap();

        let result = f.engine.transfer(&a, &b, dec!(1000.00)).await;
        match result {
            Err(Error::InsufficientFunds {
                address,
                balance,
                requested,
            }) => {
                assert_eq!(address, a);
                assert_eq!(balance, dec!(70));
                assert_eq!(requested, dec!(1000));
            }
            other => panic!("expected insufficient funds, got {other:?}"),
        }

        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(70));
        assert_eq!(f.wallets.get_balance(&b).await.unwrap(), dec!(30));
        assert_eq!(f.store.count_transactions().await.unwrap(), 0);
        assert!(f.store.locks().is_empty());
    }

    #[tokio::test]
    async fn test_exact_balance_can_be_drained() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(12.5)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(0)).await.unwrap();

        f.engine.transfer(&a, &b, dec!(12.5)).await.unwrap();
        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), Decimal::ZERO);
        assert_eq!(f.wallets.get_balance(&b).await.unwrap(), dec!(12.5));
    }

    #[tokio::test]
    async fn test_same_wallet_rejected_before_store() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();

        for amount in [dec!(10.00), dec!(0), dec!(-1)] {
            let result = f.engine.transfer(&a, &a, amount).await;
            assert!(matches!(result, Err(Error::SameWalletTransfer)));
        }

        // Unknown wallets too: nothing is looked up
        let ghost = Address::new("ghost");
        assert!(matches!(
            f.engine.transfer(&ghost, &ghost, dec!(1)).await,
            Err(Error::SameWalletTransfer)
        ));
        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_invalid_amounts() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(100)).await.unwrap();

        for amount in [Decimal::ZERO, dec!(-5), dec!(0.000000001)] {
            let result = f.engine.transfer(&a, &b, amount).await;
            assert!(matches!(result, Err(Error::InvalidAmount(_))), "{amount}");
        }
        assert_eq!(f.store.count_transactions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_sender_and_receiver_are_distinguished() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();
        let ghost = Address::new("0".repeat(64));

        let result = f.engine.transfer(&ghost, &a, dec!(1)).await;
        assert!(matches!(result, Err(Error::SenderNotFound(x)) if x == ghost));

        let result = f.engine.transfer(&a, &ghost, dec!(1)).await;
        assert!(matches!(result, Err(Error::ReceiverNotFound(x)) if x == ghost));

        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(100));
        assert!(f.store.locks().is_empty());
    }

    #[tokio::test]
    async fn test_commit_fault_rolls_back() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(100)).await.unwrap();

        f.store.inject_commit_failure();
        let result = f.engine.transfer(&a, &b, dec!(40)).await;
        assert!(matches!(result, Err(Error::Storage(_))));

        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(100));
        assert_eq!(f.wallets.get_balance(&b).await.unwrap(), dec!(100));
        assert_eq!(f.store.count_transactions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_transfer_leaves_state_untouched() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(100)).await.unwrap();

        // Hold the receiver's row so the transfer blocks mid unit of work
        let mut blocker = f.store.begin().await.unwrap();
        blocker.lock_for_update(&b).await.unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            f.engine.transfer(&a, &b, dec!(10)),
        )
        .await;
        assert!(cancelled.is_err());
        blocker.rollback();

        assert_eq!(f.wallets.get_balance(&a).await.unwrap(), dec!(100));
        assert_eq!(f.wallets.get_balance(&b).await.unwrap(), dec!(100));
        assert!(f.store.locks().is_empty());

        // Both rows are free again
        f.engine.transfer(&a, &b, dec!(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_credit_beyond_precision_is_rejected() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100000000000000000000)).await.unwrap();
        let b = f
            .wallets
            .create_wallet(dec!(700000000000000000000.00000001))
            .await
            .unwrap();

        let result = f.engine.transfer(&a, &b, dec!(100000000000000000000)).await;
        assert!(matches!(result, Err(Error::InvariantViolation(_))));

        assert_eq!(
            f.wallets.get_balance(&a).await.unwrap(),
            dec!(100000000000000000000)
        );
        assert_eq!(
            f.wallets.get_balance(&b).await.unwrap(),
            dec!(700000000000000000000.00000001)
        );
        assert_eq!(f.store.count_transactions().await.unwrap(), 0);
        assert!(f.store.locks().is_empty());

        // Smaller credits that still fit go through exactly
        f.engine.transfer(&a, &b, dec!(1)).await.unwrap();
        assert_eq!(
            f.wallets.get_balance(&b).await.unwrap(),
            dec!(700000000000000000001.00000001)
        );
    }

    #[tokio::test]
    async fn test_lock_timeout_surfaces_as_infrastructure_error() {
        let f = fixture();
        let a = f.wallets.create_wallet(dec!(100)).await.unwrap();
        let b = f.wallets.create_wallet(dec!(100)).await.unwrap();

        let mut blocker = f.store.begin().await.unwrap();
        blocker.lock_for_update(&a).await.unwrap();

        let result = f.engine.transfer(&a, &b, dec!(1)).await;
        assert!(matches!(result, Err(Error::LockTimeout(_))));
        assert!(result.unwrap_err().is_retryable());
        blocker.rollback();
    }
}
