//! # Oraclecore Protocol
//!
//! The report-generation protocol: how a committee of `n` oracles, at most
//! `f` of them Byzantine, agrees each round on a single signed report.
//!
//! ## Protocol Flow
//!
//! ```text
//! Epoch e, round r, leader l = e mod n:
//!
//! ┌──────────────┐
//! │  OBSERVE-REQ │  leader asks every follower for a fresh observation
//! │              │  follower: observe, sign with offchain key, reply
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  REPORT-REQ  │  leader bundles > 2f signed observations, sorted
//! │              │  follower: verify bundle, decide shouldReport,
//! │              │  sign the report with the onchain key, reply
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    FINAL     │  leader broadcasts the report with > f signatures
//! │              │  follower: verify, echo it to everyone
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  FINAL-ECHO  │  on > f echoes of the same report, hand it to the
//! │              │  transmission subsystem and complete the round
//! └──────────────┘
//! ```
//!
//! This crate implements the *follower* side of that exchange: the state
//! machine reacting to the four leader/peer messages. Leader election and
//! epoch scheduling belong to the pacemaker, transmission timing to the
//! transmission subsystem; both are external and connected through event
//! channels.
//!
//! ## Fault Tolerance
//!
//! - `> 2f` distinct signed observations in a report request guarantee that
//!   any two leaders' honest witness sets overlap.
//! - `> f` on-chain signatures on a final report prove more than `f`
//!   distinct oracles attested it.
//! - `> f` final-echoes guarantee at least one honest oracle decided to
//!   transmit this exact report.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod events;
pub mod follower;
pub mod messages;
pub mod observation;
pub mod signature;
pub mod telemetry;

pub use events::{PacemakerEvent, TransmitEvent};
pub use follower::{FollowerState, ReportGenerationFollower, ReportValidationError};
pub use messages::{Message, MessageError, MessageWithSender, NetSender};
pub use observation::{Observation, ObservationError};
pub use signature::{
    domains, AttestedReport, AttributedObservation, AttributedSignedObservation, ReportContext,
    SignatureError, SignedObservation,
};
pub use telemetry::{TelemetryEvent, TelemetrySender};
