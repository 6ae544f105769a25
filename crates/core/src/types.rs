//! Plain data types shared across the protocol.

use std::time::SystemTime;

use num_bigint::BigInt;
use oraclecore_crypto::{Address, OffchainPublicKey};
use serde::{Deserialize, Serialize};

/// Index of an oracle in the committee list (`0 ≤ id < N`).
pub type OracleId = u8;

/// Opaque 16-byte identifier of a contract configuration.
///
/// Equality of digests implies byte-identical configuration; the digest is
/// mixed into every signature as a domain separator, so messages and
/// signatures from one committee configuration can never be replayed under
/// another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigDigest(pub [u8; 16]);

impl ConfigDigest {
    /// The all-zero digest, used before any configuration is known.
    pub const ZERO: ConfigDigest = ConfigDigest([0u8; 16]);

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex encoding of the digest.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ConfigDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigDigest({})", self.hex())
    }
}

impl std::fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl Serialize for ConfigDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for ConfigDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("config digest must be 16 bytes"))?;
        Ok(Self(arr))
    }
}

/// The four key fields identifying one committee member.
///
/// All four must be pairwise distinct across the committee list; the config
/// decoder rejects configurations that violate this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleIdentity {
    /// Transport-level peer identifier
    pub peer_id: String,
    /// Address whose signatures the aggregation contract accepts
    pub onchain_signing_address: Address,
    /// Ed25519 key that signs observations
    pub offchain_public_key: OffchainPublicKey,
    /// Account the oracle transmits reports from
    pub transmit_address: Address,
}

/// The raw configuration blob as it appears on-chain.
///
/// `signers` and `transmitters` are indexed by oracle id; `encoded` carries
/// the serialized off-chain committee parameters and is decoded by the
/// config crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Digest identifying this configuration
    pub config_digest: ConfigDigest,
    /// On-chain signing addresses, one per oracle
    pub signers: Vec<Address>,
    /// Transmit addresses, one per oracle
    pub transmitters: Vec<Address>,
    /// The fault bound F
    pub threshold: u8,
    /// Version of the encoding used for `encoded`
    pub encoded_config_version: u64,
    /// Serialized off-chain parameters (peer ids, offchain keys, timings)
    pub encoded: Vec<u8>,
}

/// Snapshot of the aggregation contract's most recent accepted report.
#[derive(Debug, Clone)]
pub struct TransmissionDetails {
    /// Digest of the configuration the report was produced under
    pub config_digest: ConfigDigest,
    /// Epoch of the latest report
    pub epoch: u32,
    /// Round of the latest report
    pub round: u8,
    /// The current on-chain answer
    pub latest_answer: BigInt,
    /// When the latest report was accepted
    pub latest_timestamp: SystemTime,
}

/// A raw payload received from the network, attributed to a committee member.
///
/// The endpoint authenticates senders at the transport layer; by the time a
/// message reaches the protocol, `sender` is trusted to be the oracle id the
/// payload actually came from.
#[derive(Debug, Clone)]
pub struct BinaryMessageWithSender {
    /// Serialized protocol message
    pub msg: Vec<u8>,
    /// Authenticated sender
    pub sender: OracleId,
}
