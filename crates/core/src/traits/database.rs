//! Persistent storage collaborator.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::types::ContractConfig;

/// Errors from the database collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// An I/O error from the backing store
    #[error("database I/O error: {0}")]
    Io(String),

    /// Stored data could not be decoded
    #[error("corrupt database record: {0}")]
    Corrupt(String),
}

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Node-local persistence.
///
/// Exactly one record matters to the core: the last contract configuration
/// observed, which lets an oracle come back up and rejoin its committee even
/// while the chain is unreachable. No protocol state is persisted; a
/// restarted follower always begins from fresh per-round state.
///
/// Implementations must be safe for concurrent use - the restore path, the
/// config-write path and garbage collection may overlap.
#[async_trait]
pub trait Database: Send + Sync {
    /// Read the last stored configuration, if any.
    async fn read_config(&self) -> DatabaseResult<Option<ContractConfig>>;

    /// Store a configuration, replacing any previous one.
    async fn write_config(&self, config: ContractConfig) -> DatabaseResult<()>;

    /// Prune stale records older than the cutoff.
    ///
    /// What exactly is pruned is the implementation's business; the
    /// supervisor merely invokes this periodically.
    async fn collect_garbage(&self, older_than: SystemTime) -> DatabaseResult<()>;
}
