//! # Oraclecore Core
//!
//! Core types and collaborator abstractions for the off-chain reporting
//! protocol.
//!
//! The protocol core never talks to the outside world directly. Transport,
//! contract I/O, key custody, the data source, persistent storage and
//! monitoring are all *collaborators*: trait objects injected by the host
//! application. This crate defines those traits, together with the plain
//! data types that cross their boundaries.
//!
//! # Design Philosophy
//!
//! 1. **Trait-based abstractions**: every external dependency is a trait so
//!    that hosts (and tests) can swap implementations freely.
//!
//! 2. **Thread safety**: all traits require `Send + Sync`; a collaborator
//!    may be called from several protocol tasks.
//!
//! 3. **Timeout at the boundary**: collaborators are not trusted to honour
//!    cancellation. Calls into them are raced against a timer with
//!    [`detach_timeout`], and a straggler's result is discarded.

#![deny(unsafe_code)]

pub mod local_config;
pub mod traits;
pub mod types;
pub mod util;

pub use local_config::{LocalConfig, LocalConfigError};
pub use traits::{
    BinaryNetworkEndpoint, BinaryNetworkEndpointFactory, Bootstrapper, BootstrapperFactory,
    ContractConfigTracker, ContractError, ContractResult, ContractTransmitter, DataSource,
    DataSourceError, Database, DatabaseError, DatabaseResult, MonitoringEndpoint, NetworkError,
    NetworkResult, PrivateKeys,
};
pub use types::{
    BinaryMessageWithSender, ConfigDigest, ContractConfig, OracleId, OracleIdentity,
    TransmissionDetails,
};
pub use util::detach_timeout;
