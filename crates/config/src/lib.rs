//! # Oraclecore Config
//!
//! Decoding of on-chain committee configurations.
//!
//! The aggregation contract stores one [`ContractConfig`] blob per committee
//! generation. This crate translates that blob into the richer forms the
//! rest of the system consumes:
//!
//! - [`PublicConfig`] - the parameters every participant (including
//!   bootstrap nodes) can derive without key material
//! - [`SharedConfig`] - the public parameters plus the committee's shared
//!   secret, together with this node's [`OracleId`] located in the
//!   committee list
//!
//! Decoding is a pure function with no side effects; the managed supervisor
//! calls it on every configuration change.
//!
//! [`ContractConfig`]: oraclecore_core::ContractConfig
//! [`OracleId`]: oraclecore_core::OracleId

mod offchain;
mod public;
mod shared;

pub use offchain::OffchainCommitteeConfig;
pub use public::{PublicConfig, MAX_ORACLES};
pub use shared::SharedConfig;

/// Errors produced while decoding a contract configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// This node is not a member of the configured committee
    #[error("oracle not found in committee configuration")]
    NotFound,

    /// The raw blob could not be decoded
    #[error("malformed contract config: {0}")]
    Malformed(String),

    /// The blob decoded but violates a committee invariant
    #[error("invalid contract config: {0}")]
    InvalidConfig(String),
}
