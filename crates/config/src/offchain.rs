//! The serialized off-chain half of a contract configuration.

use oraclecore_crypto::OffchainPublicKey;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Encoding version this crate understands.
pub const ENCODED_CONFIG_VERSION: u64 = 1;

/// Off-chain committee parameters, carried inside
/// `ContractConfig::encoded`.
///
/// The on-chain half of the configuration (signers, transmitters, threshold)
/// lives in the blob's fixed fields; everything the contract does not need
/// to interpret is packed in here. Per-oracle vectors are indexed by oracle
/// id, parallel to the on-chain `signers`/`transmitters` lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainCommitteeConfig {
    /// Transport peer ids, one per oracle
    pub peer_ids: Vec<String>,
    /// Observation-signing public keys, one per oracle
    pub offchain_public_keys: Vec<OffchainPublicKey>,
    /// Symmetric secret shared by the committee
    pub shared_secret: [u8; 32],
    /// Resend interval for unanswered protocol messages, in milliseconds
    pub delta_resend_millis: u64,
    /// Progress timeout after which an epoch is abandoned, in milliseconds
    pub delta_progress_millis: u64,
    /// Duration of one report-generation round, in milliseconds
    pub delta_round_millis: u64,
    /// Heartbeat: maximum age of the on-chain answer before a report is
    /// forced, in milliseconds
    pub delta_c_millis: u64,
    /// Deviation threshold in parts per billion
    pub alpha_ppb: u64,
    /// Maximum number of rounds per epoch
    pub r_max: u8,
}

impl OffchainCommitteeConfig {
    /// Decode from the raw `encoded` bytes of a contract config.
    pub fn decode(version: u64, encoded: &[u8]) -> Result<Self, ConfigError> {
        if version != ENCODED_CONFIG_VERSION {
            return Err(ConfigError::Malformed(format!(
                "unsupported encoded config version {version}"
            )));
        }
        serde_json::from_slice(encoded).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Serialize into the form stored on-chain. Used by config producers
    /// and tests.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("committee config serialization cannot fail")
    }
}
