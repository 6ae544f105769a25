//! Full configuration for protocol participants.

use oraclecore_core::{ContractConfig, OracleId, PrivateKeys};
use oraclecore_crypto::Address;

use crate::offchain::OffchainCommitteeConfig;
use crate::public::PublicConfig;
use crate::ConfigError;

/// A decoded committee configuration as seen by a participating oracle.
///
/// Extends [`PublicConfig`] with the committee's shared secret. Instances
/// are immutable; the supervisor replaces the whole value atomically on a
/// configuration change.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    /// The parameters every participant derives
    pub public: PublicConfig,
    /// Symmetric secret shared by the committee
    pub shared_secret: [u8; 32],
}

impl SharedConfig {
    /// Decode a contract configuration and locate this node in the
    /// committee.
    ///
    /// The node is identified by the conjunction of all four identity
    /// fields: transport peer id, off-chain public key, on-chain signing
    /// address and transmit address. Returns [`ConfigError::NotFound`] if
    /// no committee entry matches.
    pub fn from_contract_config(
        cc: &ContractConfig,
        keys: &dyn PrivateKeys,
        peer_id: &str,
        transmit_address: Address,
    ) -> Result<(Self, OracleId), ConfigError> {
        let offchain = OffchainCommitteeConfig::decode(cc.encoded_config_version, &cc.encoded)?;
        let public = PublicConfig::assemble(cc, &offchain)?;

        let offchain_public_key = keys.public_key_offchain();
        let onchain_address = keys.onchain_address();
        let oracle_id = public
            .oracle_identities
            .iter()
            .position(|identity| {
                identity.peer_id == peer_id
                    && identity.offchain_public_key == offchain_public_key
                    && identity.onchain_signing_address == onchain_address
                    && identity.transmit_address == transmit_address
            })
            .ok_or(ConfigError::NotFound)?;

        let shared = Self {
            public,
            shared_secret: offchain.shared_secret,
        };
        Ok((shared, oracle_id as OracleId))
    }

    /// Number of oracles in the committee.
    pub fn n(&self) -> usize {
        self.public.n()
    }

    /// The leader of `epoch`.
    pub fn leader(&self, epoch: u32) -> OracleId {
        self.public.leader(epoch)
    }
}
