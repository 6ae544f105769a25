//! Wire messages exchanged between committee members.

use async_trait::async_trait;
use oraclecore_core::OracleId;
use serde::{Deserialize, Serialize};

use crate::signature::{AttestedReport, AttributedSignedObservation, SignedObservation};

/// A protocol message could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("malformed protocol message: {0}")]
pub struct MessageError(String);

/// The six message kinds of the report-generation protocol.
///
/// `ObserveReq`, `ReportReq` and `Final` flow leader → follower;
/// `Observe` and `Report` flow follower → leader; `FinalEcho` is broadcast
/// by everyone. The set is closed: decoding anything else fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Leader asks for a fresh observation
    ObserveReq {
        /// Leader's epoch
        epoch: u32,
        /// Round being started
        round: u8,
    },
    /// Follower returns its signed observation
    Observe {
        /// Epoch the observation belongs to
        epoch: u32,
        /// Round the observation belongs to
        round: u8,
        /// The signed observation
        signed_observation: SignedObservation,
    },
    /// Leader proposes a report assembled from observations
    ReportReq {
        /// Leader's epoch
        epoch: u32,
        /// Current round
        round: u8,
        /// More than `2f` attributed signed observations, sorted ascending
        observations: Vec<AttributedSignedObservation>,
    },
    /// Follower returns the report carrying its on-chain signature
    Report {
        /// Epoch the report belongs to
        epoch: u32,
        /// Round the report belongs to
        round: u8,
        /// Single-signature report contribution
        report: AttestedReport,
    },
    /// Leader broadcasts the fully attested report
    Final {
        /// Leader's epoch
        epoch: u32,
        /// Current round
        round: u8,
        /// Report with more than `f` on-chain signatures
        report: AttestedReport,
    },
    /// Any participant echoes the final report
    FinalEcho {
        /// Epoch the report belongs to
        epoch: u32,
        /// Round the report belongs to
        round: u8,
        /// The echoed report
        report: AttestedReport,
    },
}

impl Message {
    /// Serialize for the wire.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("message serialization cannot fail")
    }

    /// Deserialize from the wire, rejecting unknown or malformed payloads.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError(e.to_string()))
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ObserveReq { .. } => "observe-req",
            Message::Observe { .. } => "observe",
            Message::ReportReq { .. } => "report-req",
            Message::Report { .. } => "report",
            Message::Final { .. } => "final",
            Message::FinalEcho { .. } => "final-echo",
        }
    }
}

/// A decoded message together with its authenticated sender.
#[derive(Debug, Clone)]
pub struct MessageWithSender {
    /// The decoded message
    pub msg: Message,
    /// The committee member it came from
    pub sender: OracleId,
}

/// The protocol's view of the transport.
///
/// Implemented by the managed layer's serializing shim over a
/// `BinaryNetworkEndpoint`. Send failures are logged by the implementation;
/// the protocol treats sends as fire-and-forget, since a lost message is
/// indistinguishable from a slow network and the protocol tolerates both.
#[async_trait]
pub trait NetSender: Send + Sync {
    /// Send a message to one committee member.
    async fn send_to(&self, msg: Message, to: OracleId);

    /// Send a message to the whole committee.
    async fn broadcast(&self, msg: Message);
}
