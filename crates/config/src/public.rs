//! Public committee parameters.

use std::collections::HashSet;
use std::time::Duration;

use oraclecore_core::{ConfigDigest, ContractConfig, OracleId, OracleIdentity};

use crate::offchain::OffchainCommitteeConfig;
use crate::ConfigError;

/// Largest committee the protocol supports.
///
/// The bound keeps report calldata affordable on-chain and lets oracle ids
/// fit comfortably in a byte.
pub const MAX_ORACLES: usize = 31;

/// The part of a committee configuration every participant can derive.
///
/// Bootstrap nodes run from a `PublicConfig` alone; protocol participants
/// extend it to a [`SharedConfig`](crate::SharedConfig).
#[derive(Debug, Clone)]
pub struct PublicConfig {
    /// Digest identifying the configuration this was decoded from
    pub config_digest: ConfigDigest,
    /// The committee, indexed by oracle id
    pub oracle_identities: Vec<OracleIdentity>,
    /// Byzantine fault bound; the protocol tolerates up to `f` faulty
    /// oracles provided `3f < n`
    pub f: usize,
    /// Maximum number of rounds per epoch
    pub r_max: u8,
    /// Deviation threshold in parts per billion
    pub alpha_ppb: u64,
    /// Resend interval for unanswered protocol messages
    pub delta_resend: Duration,
    /// Progress timeout after which an epoch is abandoned
    pub delta_progress: Duration,
    /// Duration of one report-generation round
    pub delta_round: Duration,
    /// Heartbeat: maximum age of the on-chain answer before a report is
    /// forced regardless of deviation
    pub delta_c: Duration,
}

impl PublicConfig {
    /// Number of oracles in the committee.
    pub fn n(&self) -> usize {
        self.oracle_identities.len()
    }

    /// The leader of `epoch`, by round-robin rotation over the committee.
    pub fn leader(&self, epoch: u32) -> OracleId {
        (epoch as usize % self.n()) as OracleId
    }

    /// Decode the public parameters of a contract configuration.
    pub fn from_contract_config(cc: &ContractConfig) -> Result<Self, ConfigError> {
        let offchain = OffchainCommitteeConfig::decode(cc.encoded_config_version, &cc.encoded)?;
        Self::assemble(cc, &offchain)
    }

    pub(crate) fn assemble(
        cc: &ContractConfig,
        offchain: &OffchainCommitteeConfig,
    ) -> Result<Self, ConfigError> {
        let n = cc.signers.len();
        if n == 0 {
            return Err(ConfigError::InvalidConfig("empty committee".to_string()));
        }
        if n > MAX_ORACLES {
            return Err(ConfigError::InvalidConfig(format!(
                "committee of {n} oracles exceeds maximum of {MAX_ORACLES}"
            )));
        }
        if cc.transmitters.len() != n
            || offchain.peer_ids.len() != n
            || offchain.offchain_public_keys.len() != n
        {
            return Err(ConfigError::InvalidConfig(format!(
                "inconsistent committee lists: {} signers, {} transmitters, {} peer ids, {} offchain keys",
                n,
                cc.transmitters.len(),
                offchain.peer_ids.len(),
                offchain.offchain_public_keys.len(),
            )));
        }

        let f = cc.threshold as usize;
        if 3 * f >= n {
            return Err(ConfigError::InvalidConfig(format!(
                "fault bound too high: need 3f < n, got f={f}, n={n}"
            )));
        }

        let oracle_identities: Vec<OracleIdentity> = (0..n)
            .map(|i| OracleIdentity {
                peer_id: offchain.peer_ids[i].clone(),
                onchain_signing_address: cc.signers[i],
                offchain_public_key: offchain.offchain_public_keys[i],
                transmit_address: cc.transmitters[i],
            })
            .collect();
        check_distinct(&oracle_identities)?;

        let config = Self {
            config_digest: cc.config_digest,
            oracle_identities,
            f,
            r_max: offchain.r_max,
            alpha_ppb: offchain.alpha_ppb,
            delta_resend: Duration::from_millis(offchain.delta_resend_millis),
            delta_progress: Duration::from_millis(offchain.delta_progress_millis),
            delta_round: Duration::from_millis(offchain.delta_round_millis),
            delta_c: Duration::from_millis(offchain.delta_c_millis),
        };
        config.check_timing()?;
        Ok(config)
    }

    fn check_timing(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("delta_resend", self.delta_resend),
            ("delta_progress", self.delta_progress),
            ("delta_round", self.delta_round),
            ("delta_c", self.delta_c),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be strictly positive"
                )));
            }
        }
        if self.r_max == 0 {
            return Err(ConfigError::InvalidConfig(
                "r_max must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_distinct(identities: &[OracleIdentity]) -> Result<(), ConfigError> {
    let mut peer_ids = HashSet::new();
    let mut signers = HashSet::new();
    let mut offchain_keys = HashSet::new();
    let mut transmitters = HashSet::new();
    for identity in identities {
        if !peer_ids.insert(identity.peer_id.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "duplicate peer id {}",
                identity.peer_id
            )));
        }
        if !signers.insert(identity.onchain_signing_address) {
            return Err(ConfigError::InvalidConfig(format!(
                "duplicate onchain signing address {}",
                hex::encode(identity.onchain_signing_address)
            )));
        }
        if !offchain_keys.insert(identity.offchain_public_key) {
            return Err(ConfigError::InvalidConfig(
                "duplicate offchain public key".to_string(),
            ));
        }
        if !transmitters.insert(identity.transmit_address) {
            return Err(ConfigError::InvalidConfig(format!(
                "duplicate transmit address {}",
                hex::encode(identity.transmit_address)
            )));
        }
    }
    Ok(())
}
