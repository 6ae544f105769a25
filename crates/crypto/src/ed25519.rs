//! Ed25519 signing and verification (RFC 8032).
//!
//! Observations are signed with the oracle's off-chain key before being sent
//! to the leader. These signatures never reach the chain; they only convince
//! committee members that an observation really originated with the oracle
//! it is attributed to.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Result};

/// An Ed25519 keypair used for off-chain observation signing.
pub struct OffchainKeypair {
    inner: ed25519_dalek::SigningKey,
}

impl OffchainKeypair {
    /// Generate a new random keypair.
    pub fn random() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Build a keypair from 32 raw secret-key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Raw secret-key bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> OffchainPublicKey {
        OffchainPublicKey(self.inner.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, msg: &[u8]) -> OffchainSignature {
        OffchainSignature(self.inner.sign(msg).to_bytes())
    }
}

impl Clone for OffchainKeypair {
    fn clone(&self) -> Self {
        Self::from_bytes(&self.inner.to_bytes())
    }
}

impl std::fmt::Debug for OffchainKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffchainKeypair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// An Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffchainPublicKey(pub [u8; 32]);

impl OffchainPublicKey {
    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for OffchainPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OffchainPublicKey({})", hex::encode(self.0))
    }
}

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OffchainSignature(pub [u8; 64]);

impl OffchainSignature {
    /// Verify this signature over `msg` against `public_key`.
    pub fn verify(&self, msg: &[u8], public_key: &OffchainPublicKey) -> Result<()> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify(msg, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl std::fmt::Debug for OffchainSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OffchainSignature({})", hex::encode(self.0))
    }
}

impl Serialize for OffchainSignature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for OffchainSignature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(Self(arr))
    }
}
