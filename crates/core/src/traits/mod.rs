//! Collaborator traits.
//!
//! Everything the protocol core consumes from the outside world is defined
//! here as a trait, mirroring the split of responsibilities at the system
//! boundary: contract I/O, persistence, networking, keys, the data source
//! and monitoring.

mod contract;
mod database;
mod keys;
mod network;

pub use contract::{ContractConfigTracker, ContractError, ContractResult, ContractTransmitter};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use keys::{DataSource, DataSourceError, MonitoringEndpoint, PrivateKeys};
pub use network::{
    BinaryNetworkEndpoint, BinaryNetworkEndpointFactory, Bootstrapper, BootstrapperFactory,
    NetworkError, NetworkResult,
};
