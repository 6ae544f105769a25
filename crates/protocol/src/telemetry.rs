//! Telemetry records emitted by the protocol.

use oraclecore_core::{ConfigDigest, OracleId};
use serde::{Deserialize, Serialize};

/// A monitoring record. Serialized (JSON) by the telemetry forwarder and
/// shipped to the monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A new round began from this follower's perspective
    RoundStarted {
        /// Committee configuration the round runs under
        config_digest: ConfigDigest,
        /// Epoch number
        epoch: u32,
        /// Round number
        round: u8,
        /// The epoch's leader
        leader: OracleId,
        /// Wall-clock time, milliseconds since the Unix epoch
        time_unix_ms: u64,
    },
}

/// Sink for telemetry records.
///
/// Implementations must not block: monitoring is best-effort and a slow
/// sink must never stall the protocol.
pub trait TelemetrySender: Send + Sync {
    /// Record the start of a round.
    fn round_started(&self, config_digest: ConfigDigest, epoch: u32, round: u8, leader: OracleId);
}
