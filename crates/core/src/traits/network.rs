//! Network transport collaborators.
//!
//! The endpoint moves opaque byte payloads between committee members and
//! authenticates senders; serialization of protocol messages happens above
//! it, in the managed layer's serializing shim.

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{BinaryMessageWithSender, ConfigDigest, OracleId};

/// Errors from the transport collaborators.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Endpoint construction failed
    #[error("could not build endpoint: {0}")]
    Setup(String),

    /// The endpoint is not running
    #[error("endpoint not running")]
    NotRunning,

    /// A send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Generic transport failure
    #[error("network error: {0}")]
    Internal(String),
}

/// Result type for transport operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// A running transport endpoint scoped to one committee configuration.
///
/// Exactly one protocol instance owns an endpoint at a time; the supervisor
/// closes it before building a successor.
#[async_trait]
pub trait BinaryNetworkEndpoint: Send + Sync {
    /// Send a payload to a single committee member.
    ///
    /// May suspend on the endpoint's token bucket.
    async fn send_to(&self, payload: Vec<u8>, to: OracleId) -> NetworkResult<()>;

    /// Send a payload to every committee member.
    async fn broadcast(&self, payload: Vec<u8>) -> NetworkResult<()>;

    /// Receive the next inbound payload.
    ///
    /// Returns `None` once the endpoint is closed and drained.
    async fn recv(&self) -> Option<BinaryMessageWithSender>;

    /// Start the endpoint.
    async fn start(&self) -> NetworkResult<()>;

    /// Close the endpoint, releasing transport resources.
    async fn close(&self) -> NetworkResult<()>;
}

/// Builds endpoints scoped to a committee configuration.
#[async_trait]
pub trait BinaryNetworkEndpointFactory: Send + Sync {
    /// This node's transport-level peer id.
    fn peer_id(&self) -> String;

    /// Build an endpoint for the committee identified by `config_digest`.
    ///
    /// `token_bucket_refill_rate` (messages per second) and
    /// `token_bucket_size` bound this node's outbound rate per peer; the
    /// supervisor derives them from the configuration's timing parameters.
    #[allow(clippy::too_many_arguments)]
    async fn make_endpoint(
        &self,
        config_digest: ConfigDigest,
        peer_ids: Vec<String>,
        bootstrappers: Vec<String>,
        f: usize,
        token_bucket_refill_rate: f64,
        token_bucket_size: usize,
    ) -> NetworkResult<Arc<dyn BinaryNetworkEndpoint>>;
}

/// A running DHT bootstrapper, the bootstrap node's only active component.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Start bootstrapping.
    async fn start(&self) -> NetworkResult<()>;

    /// Stop and release resources.
    async fn close(&self) -> NetworkResult<()>;
}

/// Builds bootstrappers scoped to a committee configuration.
#[async_trait]
pub trait BootstrapperFactory: Send + Sync {
    /// Build a bootstrapper for the committee identified by `config_digest`.
    async fn make_bootstrapper(
        &self,
        config_digest: ConfigDigest,
        peer_ids: Vec<String>,
        bootstrappers: Vec<String>,
        f: usize,
    ) -> NetworkResult<Arc<dyn Bootstrapper>>;
}
