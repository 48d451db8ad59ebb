//! Hashing for wallet addresses
//!
//! An address is the hex-encoded SHA-256 digest of a freshly generated
//! random UUIDv4, giving a fixed-width 64 character identifier.

use crate::types::Address;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a new random wallet address
pub fn generate_address() -> Address {
    let token = Uuid::new_v4().to_string();
    Address::new(hex::encode(hash_bytes(token.as_bytes())))
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
