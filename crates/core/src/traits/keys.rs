//! Key custody, data source and monitoring collaborators.

use async_trait::async_trait;
use num_bigint::BigInt;
use oraclecore_crypto::{Address, OffchainPublicKey, OffchainSignature, ReportSignature};

/// The data source failed to produce a value.
#[derive(Debug, thiserror::Error)]
#[error("data source error: {0}")]
pub struct DataSourceError(pub String);

/// Provides the numeric value this oracle observes each round.
///
/// Implementations are expected to be slow and flaky - they typically sit in
/// front of external APIs. The core wraps every call in
/// `data_source_timeout` and treats a timeout as a missing observation.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch a fresh observation.
    async fn observe(&self) -> Result<BigInt, DataSourceError>;
}

/// Custody of this node's signing keys.
///
/// The core never sees secret key material, only signing operations and the
/// public halves. Implementations are read-only after startup.
pub trait PrivateKeys: Send + Sync {
    /// Sign `msg` with the off-chain (observation) key.
    fn sign_offchain(&self, msg: &[u8]) -> Result<OffchainSignature, oraclecore_crypto::CryptoError>;

    /// Sign `msg` with the on-chain (report) key.
    fn sign_onchain(&self, msg: &[u8]) -> Result<ReportSignature, oraclecore_crypto::CryptoError>;

    /// Public half of the off-chain key.
    fn public_key_offchain(&self) -> OffchainPublicKey;

    /// Address derived from the on-chain key.
    fn onchain_address(&self) -> Address;
}

/// Sink for monitoring/telemetry records.
///
/// Delivery is best-effort; the implementation must not block.
pub trait MonitoringEndpoint: Send + Sync {
    /// Ship one serialized telemetry record.
    fn send_log(&self, log: Vec<u8>);
}
