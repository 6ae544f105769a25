//! # Oraclecore Crypto
//!
//! Cryptographic primitives for the off-chain reporting protocol.
//!
//! This crate provides:
//! - **Keccak256 hashing** - used for all signature payloads
//! - **Recoverable ECDSA signatures** - secp256k1, Ethereum-style; these are
//!   the "on-chain" signatures that attest a report and are checked by the
//!   aggregation contract via address recovery
//! - **Ed25519 signatures** - the "off-chain" signatures that oracles place
//!   on individual observations
//!
//! Key custody lives outside this crate: the protocol only ever sees a
//! `PrivateKeys` implementation. The key types here exist so that tests and
//! key providers have something concrete to build on, and so that signature
//! *verification* (which happens in-core, against public material from the
//! committee configuration) has a home.

pub mod ecdsa;
pub mod ed25519;
pub mod hash;

pub use ecdsa::{Address, OnchainKeypair, ReportSignature};
pub use ed25519::{OffchainKeypair, OffchainPublicKey, OffchainSignature};
pub use hash::{keccak256, keccak256_concat};

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Signature verification failed
    #[error("signature verification failed")]
    VerificationFailed,

    /// Failed to recover a public key from a recoverable signature
    #[error("failed to recover public key: {0}")]
    RecoveryFailed(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
