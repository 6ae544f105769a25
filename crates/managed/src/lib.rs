//! # Oraclecore Managed
//!
//! Long-lived supervision of the report-generation protocol.
//!
//! The protocol itself (one follower, one endpoint) is scoped to a single
//! committee configuration. This crate owns everything *around* it:
//!
//! - watching the aggregation contract for configuration changes,
//! - tearing the protocol down and bringing it back up under a new
//!   configuration without leaking endpoints, tasks or database writes,
//! - restoring the last known configuration from the database at startup so
//!   an oracle rejoins its committee even while the chain is unreachable,
//! - forwarding telemetry to the monitoring endpoint, and
//! - periodic database garbage collection.
//!
//! Two entry points exist: [`Oracle`] runs a full protocol participant;
//! [`BootstrapNode`] is its degenerate sibling that only tracks
//! configuration and keeps a DHT bootstrapper alive.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod bootstrap;
mod config_tracker;
mod endpoint;
mod gc;
mod oracle;
mod telemetry;

pub use bootstrap::{BootstrapNode, BootstrapNodeArgs};
pub use config_tracker::track_config;
pub use oracle::{Oracle, OracleArgs};
pub use telemetry::{forward_telemetry, ChannelTelemetrySender};
