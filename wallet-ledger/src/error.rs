//! Error types for the wallet ledger

use crate::types::Address;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transfer with identical sender and receiver
    #[error("Cannot transfer funds to the same wallet")]
    SameWalletTransfer,

    /// Amount is not positive or carries too many fractional digits
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Negative record count requested
    #[error("Invalid count: {0}")]
    InvalidCount(i64),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),

    /// Sender wallet of a transfer not found
    #[error("Sender wallet not found: {0}")]
    SenderNotFound(Address),

    /// Receiver wallet of a transfer not found
    #[error("Receiver wallet not found: {0}")]
    ReceiverNotFound(Address),

    /// Ledger holds no transactions yet
    #[error("No transactions recorded")]
    NoTransactions,

    /// Wallet address already taken
    #[error("Wallet already exists: {0}")]
    WalletExists(Address),

    /// Sender balance below the requested amount
    #[error("Insufficient funds in wallet {address}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Sender address
        address: Address,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[cfg(feature = "rocksdb")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Row lock not acquired within the configured timeout
    #[error("Lock timeout on wallet {0}")]
    LockTimeout(Address),

    /// Operation cancelled by its caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Row written without holding its lock
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Invariant violation (negative balance, overflow, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Bulk wallet creation partially failed
    #[error("{failed} of {total} wallet creations failed")]
    Seeding {
        /// Number of failed creations
        failed: usize,
        /// Number of attempted creations
        total: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse error classification used by presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied invalid input; nothing was read or written
    Validation,
    /// Referenced data does not exist
    NotFound,
    /// Uniqueness conflict
    Conflict,
    /// Business rule rejected the operation
    BusinessRule,
    /// Storage, locking or runtime failure
    Infrastructure,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SameWalletTransfer | Error::InvalidAmount(_) | Error::InvalidCount(_) => {
                ErrorKind::Validation
            }
            Error::WalletNotFound(_)
            | Error::SenderNotFound(_)
            | Error::ReceiverNotFound(_)
            | Error::NoTransactions => ErrorKind::NotFound,
            Error::WalletExists(_) => ErrorKind::Conflict,
            Error::InsufficientFunds { .. } => ErrorKind::BusinessRule,
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Whether the caller is at fault (maps to a client error response)
    pub fn is_client_fault(&self) -> bool {
        self.kind() != ErrorKind::Infrastructure
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure && !matches!(self, Error::Config(_))
    }

    /// Short stable label, used as a metrics dimension
    pub fn label(&self) -> &'static str {
        match self {
            Error::SameWalletTransfer => "same_wallet",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InvalidCount(_) => "invalid_count",
            Error::WalletNotFound(_) => "wallet_not_found",
            Error::SenderNotFound(_) => "sender_not_found",
            Error::ReceiverNotFound(_) => "receiver_not_found",
            Error::NoTransactions => "no_transactions",
            Error::WalletExists(_) => "wallet_exists",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::LockTimeout(_) => "lock_timeout",
            Error::Cancelled => "cancelled",
            _ => "infrastructure",
        }
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let address = Address::new("a".repeat(64));

        assert_eq!(Error::SameWalletTransfer.kind(), ErrorKind::Validation);
        assert_eq!(Error::InvalidCount(-1).kind(), ErrorKind::Validation);
        assert_eq!(Error::SenderNotFound(address.clone()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::NoTransactions.kind(), ErrorKind::NotFound);
        assert_eq!(Error::WalletExists(address.clone()).kind(), ErrorKind::Conflict);
        assert_eq!(
            Error::InsufficientFunds {
                address: address.clone(),
                balance: Decimal::ZERO,
                requested: Decimal::ONE,
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(Error::LockTimeout(address).kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn test_client_fault_and_retry() {
        assert!(Error::SameWalletTransfer.is_client_fault());
        assert!(!Error::SameWalletTransfer.is_retryable());

        let storage = Error::Storage("disk full".to_string());
        assert!(!storage.is_client_fault());
        assert!(storage.is_retryable());

        assert!(!Error::Config("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_seeding_message() {
        let err = Error::Seeding { failed: 3, total: 10 };
        assert_eq!(err.to_string(), "3 of 10 wallet creations failed");
    }
}
