//! On-chain contract collaborators.

use async_trait::async_trait;
use oraclecore_crypto::Address;
use tokio::sync::mpsc;

use crate::types::{ConfigDigest, ContractConfig, TransmissionDetails};

/// Errors from contract-facing collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// The underlying chain client failed
    #[error("chain client error: {0}")]
    Client(String),

    /// No configuration has ever been set on the contract
    #[error("contract has no configuration")]
    NoConfig,

    /// The contract returned data the client could not interpret
    #[error("malformed contract data: {0}")]
    Malformed(String),
}

/// Result type for contract operations.
pub type ContractResult<T> = Result<T, ContractError>;

/// Watches the aggregation contract for configuration changes.
///
/// Used exclusively by the supervisor's tracker task, which merges the
/// subscription stream with periodic polling and dedups by digest.
#[async_trait]
pub trait ContractConfigTracker: Send + Sync {
    /// Subscribe to push notifications of new configurations.
    ///
    /// Implementations that cannot push may return an empty channel; the
    /// tracker falls back to polling either way.
    async fn subscribe_new_configs(&self) -> ContractResult<mpsc::Receiver<ContractConfig>>;

    /// The block height and digest of the latest configuration change.
    async fn latest_config_details(&self) -> ContractResult<(u64, ConfigDigest)>;

    /// Fetch the full configuration with the given digest from chain logs.
    async fn config_from_logs(&self, digest: ConfigDigest) -> ContractResult<ContractConfig>;
}

/// Read access to the aggregation contract's transmission state.
#[async_trait]
pub trait ContractTransmitter: Send + Sync {
    /// The contract's most recently accepted report.
    async fn latest_transmission_details(&self) -> ContractResult<TransmissionDetails>;

    /// The account this node transmits reports from.
    fn from_address(&self) -> Address;
}
