//! The managed bootstrap node.
//!
//! A bootstrap node connects to a feed and listens for configuration
//! changes but never participates in the protocol; it only keeps a DHT
//! bootstrapper alive so committee members can find each other.

use std::sync::Arc;

use oraclecore_config::PublicConfig;
use oraclecore_core::{
    detach_timeout, Bootstrapper, BootstrapperFactory, ConfigDigest, ContractConfig,
    ContractConfigTracker, Database, LocalConfig, LocalConfigError,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config_tracker::track_config;
use crate::oracle::CONFIG_QUEUE_CAPACITY;

/// Everything a managed bootstrap node needs from its host.
pub struct BootstrapNodeArgs {
    /// Builds bootstrappers per configuration
    pub bootstrapper_factory: Arc<dyn BootstrapperFactory>,
    /// Addresses of other DHT bootstrapper nodes
    pub bootstrappers: Vec<String>,
    /// Watches the contract for configuration changes
    pub contract_config_tracker: Arc<dyn ContractConfigTracker>,
    /// Node-local persistence
    pub database: Arc<dyn Database>,
    /// Node-local tuning
    pub local_config: LocalConfig,
}

/// Handle to a running managed bootstrap node.
pub struct BootstrapNode {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl BootstrapNode {
    /// Validate the local configuration and spawn the supervisor.
    pub fn start(args: BootstrapNodeArgs) -> Result<Self, LocalConfigError> {
        args.local_config.validate()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_managed_bootstrap_node(
            args,
            shutdown_tx.clone(),
            shutdown_rx,
        ));
        Ok(Self { shutdown_tx, task })
    }

    /// Shut down the supervisor and everything it spawned.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

struct ManagedBootstrapState {
    args: BootstrapNodeArgs,
    config_digest: ConfigDigest,
    bootstrapper: Option<Arc<dyn Bootstrapper>>,
}

async fn run_managed_bootstrap_node(
    args: BootstrapNodeArgs,
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let shutdown_tracker = shutdown.subscribe();
    drop(shutdown);

    let mut state = ManagedBootstrapState {
        args,
        config_digest: ConfigDigest::ZERO,
        bootstrapper: None,
    };

    if let Some(cc) = state.restore_config().await {
        state.config_changed(cc).await;
    }

    let (new_config_tx, mut new_config_rx) = mpsc::channel(CONFIG_QUEUE_CAPACITY);
    let tracker_task = tokio::spawn(track_config(
        Arc::clone(&state.args.contract_config_tracker),
        state.config_digest,
        state.args.local_config.clone(),
        new_config_tx,
        shutdown_tracker,
    ));

    loop {
        tokio::select! {
            Some(change) = new_config_rx.recv() => {
                info!(
                    old_config_digest = %state.config_digest,
                    new_config_digest = %change.config_digest,
                    "managed bootstrap node: switching between configs"
                );
                state.config_changed(change).await;
            }
            _ = shutdown_rx.recv() => {
                debug!("managed bootstrap node: winding down");
                state.close_bootstrapper().await;
                let _ = tracker_task.await;
                debug!("managed bootstrap node: exiting");
                return;
            }
        }
    }
}

impl ManagedBootstrapState {
    async fn restore_config(&self) -> Option<ContractConfig> {
        let database = Arc::clone(&self.args.database);
        let result = detach_timeout(self.args.local_config.database_timeout, async move {
            database.read_config().await
        })
        .await;
        match result {
            None => {
                error!(
                    timeout = ?self.args.local_config.database_timeout,
                    "managed bootstrap node: database timed out while restoring configuration"
                );
                None
            }
            Some(Err(e)) => {
                error!(
                    error = %e,
                    "managed bootstrap node: error reading configuration from database"
                );
                None
            }
            Some(Ok(None)) => {
                info!("managed bootstrap node: no configuration to restore");
                None
            }
            Some(Ok(Some(cc))) => Some(cc),
        }
    }

    async fn config_changed(&mut self, contract_config: ContractConfig) {
        // Cease any operation from earlier configs
        self.close_bootstrapper().await;

        let config = match PublicConfig::from_contract_config(&contract_config) {
            Ok(config) => config,
            Err(e) => {
                error!(
                    error = %e,
                    "managed bootstrap node: error while decoding configuration"
                );
                return;
            }
        };

        let peer_ids: Vec<String> = config
            .oracle_identities
            .iter()
            .map(|identity| identity.peer_id.clone())
            .collect();

        let bootstrapper = match self
            .args
            .bootstrapper_factory
            .make_bootstrapper(
                config.config_digest,
                peer_ids,
                self.args.bootstrappers.clone(),
                config.f,
            )
            .await
        {
            Ok(bootstrapper) => bootstrapper,
            Err(e) => {
                error!(
                    config_digest = %config.config_digest,
                    error = %e,
                    "managed bootstrap node: error during make_bootstrapper"
                );
                return;
            }
        };

        if let Err(e) = bootstrapper.start().await {
            error!(
                config_digest = %config.config_digest,
                error = %e,
                "managed bootstrap node: error starting bootstrapper"
            );
            return;
        }

        self.bootstrapper = Some(bootstrapper);
        self.config_digest = contract_config.config_digest;

        let database = Arc::clone(&self.args.database);
        let to_store = contract_config.clone();
        let stored = detach_timeout(self.args.local_config.database_timeout, async move {
            database.write_config(to_store).await
        })
        .await;
        match stored {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                // We can keep running even without storing the config
                error!(
                    error = %e,
                    "managed bootstrap node: error writing new config to database"
                );
            }
            None => {
                error!("managed bootstrap node: database timed out writing new config");
            }
        }
    }

    async fn close_bootstrapper(&mut self) {
        if let Some(bootstrapper) = self.bootstrapper.take() {
            if let Err(e) = bootstrapper.close().await {
                // Not much to do apart from logging
                error!(
                    error = %e,
                    "managed bootstrap node: error while closing bootstrapper"
                );
            }
        }
    }
}
