//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (serde, bincode for the RocksDB backend)
//! - Exact arithmetic (Decimal for money, never floating point)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional digits carried by every balance and amount
pub const MONEY_SCALE: u32 = 8;

/// Wallet address: 64 lowercase hex characters (SHA-256 digest)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Length of a generated address in characters
    pub const LEN: usize = 64;

    /// Wrap an address string as supplied by a caller
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get as bytes (storage key)
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Wallet row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique, immutable address
    pub address: Address,

    /// Current balance, never negative
    pub balance: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// New wallet row stamped with the current time
    pub fn new(address: Address, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            address,
            balance,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Committed transfer record (immutable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Commit sequence number, strictly increasing
    pub id: u64,

    /// Sender address
    pub from: Address,

    /// Receiver address
    pub to: Address,

    /// Transferred amount, strictly positive
    pub amount: Decimal,

    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

/// Transfer record staged inside a unit of work, before commit assigns
/// its sequence number and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Sender address
    pub from: Address,
    /// Receiver address
    pub to: Address,
    /// Amount
    pub amount: Decimal,
}

impl NewTransaction {
    /// Finalize into a committed record
    pub fn into_committed(self, id: u64, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            from: self.from,
            to: self.to,
            amount: self.amount,
            created_at,
        }
    }
}

/// Rescale `amount` to [`MONEY_SCALE`] fractional digits.
///
/// Returns `None` when the value has more significant fractional digits than
/// the ledger carries, or is too large to be represented at that scale.
pub fn to_money_scale(amount: Decimal) -> Option<Decimal> {
    if amount.normalize().scale() > MONEY_SCALE {
        return None;
    }

    let mut scaled = amount;
    scaled.rescale(MONEY_SCALE);
    (scaled.scale() == MONEY_SCALE && scaled == amount).then_some(scaled)
}

/// Validate a transfer amount: strictly positive, representable at ledger scale
pub fn transfer_amount(amount: Decimal) -> crate::Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(crate::Error::InvalidAmount(amount));
    }
    to_money_scale(amount).ok_or(crate::Error::InvalidAmount(amount))
}

/// Validate a starting balance: non-negative, representable at ledger scale
pub fn starting_balance(balance: Decimal) -> crate::Result<Decimal> {
    if balance < Decimal::ZERO {
        return Err(crate::Error::InvalidAmount(balance));
    }
    // -0 normalizes to 0
    to_money_scale(balance.abs()).ok_or(crate::Error::InvalidAmount(balance))
}
