//! Recoverable ECDSA signatures over secp256k1.
//!
//! Reports are attested with Ethereum-style signatures: the payload is
//! keccak-hashed, signed recoverably, and verified by recovering the signer
//! address and comparing it against the committee's on-chain signing
//! addresses. The contract performs the same recovery, so no public keys
//! need to travel with a report.

use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{keccak256, CryptoError, Result};

/// Ethereum-style 20-byte address
pub type Address = [u8; 20];

/// A secp256k1 keypair used for on-chain report attestation.
#[derive(Clone)]
pub struct OnchainKeypair {
    inner: SigningKey,
}

impl OnchainKeypair {
    /// Generate a random keypair using the OS RNG.
    pub fn random() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Build a keypair from 32 raw secret-key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = SigningKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Raw secret-key bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// The signing address derived from this keypair's public key.
    ///
    /// address = keccak256(uncompressed_pubkey)[12..32]
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.inner.verifying_key())
    }

    /// Sign a message: keccak-hash it, then produce a recoverable signature.
    pub fn sign(&self, msg: &[u8]) -> Result<ReportSignature> {
        let hash = keccak256(msg);
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(&hash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        Ok(ReportSignature {
            r: sig.r().to_bytes().into(),
            s: sig.s().to_bytes().into(),
            v: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for OnchainKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnchainKeypair")
            .field("address", &hex::encode(self.address()))
            .finish()
    }
}

/// A recoverable ECDSA signature over a report (r || s || v, 65 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSignature {
    /// The r component (32 bytes)
    pub r: [u8; 32],
    /// The s component (32 bytes)
    pub s: [u8; 32],
    /// Recovery id (0 or 1)
    pub v: u8,
}

impl ReportSignature {
    /// Rebuild a signature from its 65-byte encoding.
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s, v: bytes[64] }
    }

    /// The 65-byte r || s || v encoding.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Recover the signing address from this signature and the message.
    pub fn recover(&self, msg: &[u8]) -> Result<Address> {
        let hash = keccak256(msg);
        let sig = self.to_k256()?;
        let recovery_id = RecoveryId::from_byte(self.v)
            .ok_or_else(|| CryptoError::RecoveryFailed("invalid recovery id".to_string()))?;

        let verifying_key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id)
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

        Ok(address_from_verifying_key(&verifying_key))
    }

    /// Check that this signature was produced over `msg` by `expected`.
    pub fn verify(&self, msg: &[u8], expected: &Address) -> Result<()> {
        if self.recover(msg)? == *expected {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    fn to_k256(&self) -> Result<K256Signature> {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        K256Signature::from_bytes((&bytes).into())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl std::fmt::Debug for ReportSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSignature")
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .field("v", &self.v)
            .finish()
    }
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 prefix
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..32]);
    address
}
