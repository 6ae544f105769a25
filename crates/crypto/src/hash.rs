//! Keccak256 hashing.
//!
//! Every signature payload in the protocol is keccak-hashed before signing,
//! matching what the aggregation contract computes on-chain.

use sha3::{Digest, Keccak256};

/// Compute the Keccak256 hash of the input data.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Keccak256 hash of several byte slices concatenated.
///
/// Equivalent to hashing the concatenation, without allocating it.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
