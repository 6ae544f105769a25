//! Signing and verification of protocol artefacts.
//!
//! Two kinds of signature flow through a round:
//!
//! - an **observation signature** (ed25519, off-chain key) binds one
//!   oracle's observation to a `(config digest, epoch, round)` context, and
//! - a **report signature** (recoverable ECDSA, on-chain key) attests the
//!   assembled report; the aggregation contract verifies these by address
//!   recovery.
//!
//! Every payload is hashed as
//! `keccak256(domain_tag || config_digest || epoch || round || canonical(payload))`
//! before signing. The domain tag separates the two signature kinds, and the
//! context prefix makes replay across configurations, epochs or rounds
//! impossible.

use std::collections::BTreeMap;

use oraclecore_core::{ConfigDigest, OracleId, PrivateKeys};
use oraclecore_crypto::{keccak256, Address, OffchainPublicKey, OffchainSignature, ReportSignature};
use serde::{Deserialize, Serialize};

use crate::observation::{Observation, ObservationError, CANONICAL_LEN};

/// Domain separators for signature security.
///
/// These prefixes prevent a signature produced in one context from being
/// replayed in another. An observation signature can never pass as a report
/// signature, and vice versa.
pub mod domains {
    /// Domain separator for observation signatures
    pub const OBSERVATION: &[u8] = b"ORACLECORE_OBSERVATION_V1";
    /// Domain separator for report signatures
    pub const REPORT: &[u8] = b"ORACLECORE_REPORT_V1";
}

/// The `(config digest, epoch, round)` triple mixed into every signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportContext {
    /// Digest of the committee configuration
    pub config_digest: ConfigDigest,
    /// Current epoch
    pub epoch: u32,
    /// Current round within the epoch
    pub round: u8,
}

impl ReportContext {
    fn prefix(&self, domain: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(domain.len() + 16 + 4 + 1);
        bytes.extend_from_slice(domain);
        bytes.extend_from_slice(self.config_digest.as_bytes());
        bytes.extend_from_slice(&self.epoch.to_le_bytes());
        bytes.push(self.round);
        bytes
    }
}

/// Errors verifying or producing protocol signatures.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// Missing observations carry no value to sign
    #[error("cannot sign or verify a missing observation")]
    MissingObservation,

    /// The underlying cryptographic operation failed
    #[error("crypto error: {0}")]
    Crypto(#[from] oraclecore_crypto::CryptoError),

    /// A report signature recovers to an address outside the committee
    #[error("signature by non-committee address {}", hex::encode(.0))]
    UnknownSigner(Address),

    /// Two report signatures recover to the same committee member
    #[error("duplicate signature by oracle {0}")]
    DuplicateSigner(OracleId),

    /// A report carries no signatures at all
    #[error("report carries no signatures")]
    EmptyReport,
}

impl From<ObservationError> for SignatureError {
    fn from(_: ObservationError) -> Self {
        SignatureError::MissingObservation
    }
}

/// An observation bound to a round context by its maker's off-chain key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedObservation {
    /// The observed value
    pub observation: Observation,
    /// Ed25519 signature over the hashed observation payload
    pub signature: OffchainSignature,
}

impl SignedObservation {
    /// Sign an observation for the given context.
    ///
    /// Refuses to sign the missing sentinel.
    pub fn sign(
        observation: Observation,
        context: &ReportContext,
        keys: &dyn PrivateKeys,
    ) -> Result<Self, SignatureError> {
        let msg = observation_msg(&observation, context)?;
        let signature = keys.sign_offchain(&msg)?;
        Ok(Self {
            observation,
            signature,
        })
    }

    /// Verify the signature against an oracle's off-chain public key.
    pub fn verify(
        &self,
        context: &ReportContext,
        public_key: &OffchainPublicKey,
    ) -> Result<(), SignatureError> {
        let msg = observation_msg(&self.observation, context)?;
        self.signature.verify(&msg, public_key)?;
        Ok(())
    }
}

fn observation_msg(
    observation: &Observation,
    context: &ReportContext,
) -> Result<[u8; 32], SignatureError> {
    let mut payload = context.prefix(domains::OBSERVATION);
    payload.extend_from_slice(&observation.canonical_bytes()?);
    Ok(keccak256(&payload))
}

/// A signed observation attributed to the oracle whose key produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedSignedObservation {
    /// The signed observation
    pub signed_observation: SignedObservation,
    /// The oracle claimed to have made it; untrusted until the signature
    /// is checked against that oracle's key
    pub observer: OracleId,
}

/// An observation attributed to its maker, signature already checked and
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedObservation {
    /// The observed value
    pub observation: Observation,
    /// The oracle that made it
    pub observer: OracleId,
}

/// A median-centred report carrying one or more on-chain signatures.
///
/// The leader assembles the full report with more than `f` signatures;
/// individual followers contribute single-signature instances of the same
/// structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedReport {
    /// Attributed observations, sorted ascending by value
    pub attributed_observations: Vec<AttributedObservation>,
    /// Recoverable ECDSA signatures over the canonical report encoding
    pub signatures: Vec<ReportSignature>,
}

impl AttestedReport {
    /// Sign an observation list with this node's on-chain key, producing a
    /// single-signature report (a follower's contribution).
    pub fn sign_as(
        attributed_observations: Vec<AttributedObservation>,
        context: &ReportContext,
        keys: &dyn PrivateKeys,
    ) -> Result<Self, SignatureError> {
        let msg = report_msg(&attributed_observations, context)?;
        let signature = keys.sign_onchain(&msg)?;
        Ok(Self {
            attributed_observations,
            signatures: vec![signature],
        })
    }

    /// Verify that every signature is valid and made by a distinct
    /// committee member; returns the number of distinct signers.
    ///
    /// `committee` maps on-chain signing addresses to oracle ids.
    pub fn verify_signatures(
        &self,
        context: &ReportContext,
        committee: &BTreeMap<Address, OracleId>,
    ) -> Result<usize, SignatureError> {
        if self.signatures.is_empty() {
            return Err(SignatureError::EmptyReport);
        }
        let msg = report_msg(&self.attributed_observations, context)?;

        let mut seen = [false; 256];
        for signature in &self.signatures {
            let address = signature.recover(&msg)?;
            let oracle_id = *committee
                .get(&address)
                .ok_or(SignatureError::UnknownSigner(address))?;
            if seen[oracle_id as usize] {
                return Err(SignatureError::DuplicateSigner(oracle_id));
            }
            seen[oracle_id as usize] = true;
        }
        Ok(self.signatures.len())
    }

    /// Verify that this node's own contribution carries a valid signature
    /// by `address`.
    pub fn verify_contribution(
        &self,
        context: &ReportContext,
        address: &Address,
    ) -> Result<(), SignatureError> {
        let msg = report_msg(&self.attributed_observations, context)?;
        for signature in &self.signatures {
            signature.verify(&msg, address)?;
        }
        Ok(())
    }

    /// The median observation (upper median for even lengths).
    pub fn median(&self) -> Option<&Observation> {
        self.attributed_observations
            .get(self.attributed_observations.len() / 2)
            .map(|attributed| &attributed.observation)
    }
}

fn report_msg(
    observations: &[AttributedObservation],
    context: &ReportContext,
) -> Result<[u8; 32], SignatureError> {
    let mut payload = context.prefix(domains::REPORT);
    payload.reserve(1 + observations.len() * (1 + CANONICAL_LEN));
    payload.push(observations.len() as u8);
    for attributed in observations {
        payload.push(attributed.observer);
        payload.extend_from_slice(&attributed.observation.canonical_bytes()?);
    }
    Ok(keccak256(&payload))
}
