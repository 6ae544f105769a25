//! The managed oracle supervisor.
//!
//! A single-threaded event loop that owns the lifecycle of one protocol
//! instance. On every configuration change it tears the old instance down
//! completely - cancel the protocol subtree, wait for its tasks to exit,
//! close the endpoint - before building the next one, so there is never
//! more than one live endpoint. Errors during a transition abort that
//! transition but leave the supervisor running; the next configuration
//! change can recover.

use std::sync::Arc;

use oraclecore_config::{PublicConfig, SharedConfig};
use oraclecore_core::{
    detach_timeout, BinaryNetworkEndpoint, BinaryNetworkEndpointFactory, ConfigDigest,
    ContractConfig, ContractConfigTracker, ContractTransmitter, DataSource, Database, LocalConfig,
    LocalConfigError, MonitoringEndpoint, PrivateKeys,
};
use oraclecore_protocol::{
    MessageWithSender, PacemakerEvent, ReportGenerationFollower, TelemetryEvent, TransmitEvent,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config_tracker::track_config;
use crate::endpoint::{pump_inbound, SerializingEndpoint};
use crate::gc::collect_garbage;
use crate::telemetry::{forward_telemetry, ChannelTelemetrySender};

/// Telemetry records buffered between protocol and forwarder.
const TELEMETRY_QUEUE_CAPACITY: usize = 100;

/// Configuration changes buffered between tracker and supervisor.
pub(crate) const CONFIG_QUEUE_CAPACITY: usize = 5;

/// Inbound messages buffered between endpoint pump and follower.
const INBOUND_QUEUE_CAPACITY: usize = 32;

/// Epoch a fresh protocol instance starts in. Epoch 0 is reserved: the
/// contract reports epoch 0 only before its first transmission.
const INITIAL_EPOCH: u32 = 1;

/// Everything a managed oracle needs from its host.
pub struct OracleArgs {
    /// Addresses of DHT bootstrapper nodes
    pub bootstrappers: Vec<String>,
    /// Watches the contract for configuration changes
    pub config_tracker: Arc<dyn ContractConfigTracker>,
    /// Read access to the contract's transmission state
    pub contract_transmitter: Arc<dyn ContractTransmitter>,
    /// Node-local persistence
    pub database: Arc<dyn Database>,
    /// Source of observed values
    pub datasource: Arc<dyn DataSource>,
    /// Node-local tuning
    pub local_config: LocalConfig,
    /// Optional telemetry sink
    pub monitoring_endpoint: Option<Arc<dyn MonitoringEndpoint>>,
    /// Builds transport endpoints per configuration
    pub net_endpoint_factory: Arc<dyn BinaryNetworkEndpointFactory>,
    /// This node's signing keys
    pub private_keys: Arc<dyn PrivateKeys>,
    /// Where follower instances emit pacemaker events
    pub to_pacemaker: mpsc::Sender<PacemakerEvent>,
    /// Where follower instances emit finalized reports
    pub to_transmission: mpsc::Sender<TransmitEvent>,
}

/// Handle to a running managed oracle.
pub struct Oracle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Oracle {
    /// Validate the local configuration and spawn the supervisor.
    pub fn start(args: OracleArgs) -> Result<Self, LocalConfigError> {
        args.local_config.validate()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_managed_oracle(args, shutdown_tx.clone(), shutdown_rx));
        Ok(Self { shutdown_tx, task })
    }

    /// Shut down the supervisor and everything it spawned.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// One live protocol instance: its cancellation root, its two tasks, and
/// the endpoint they share.
struct RunningProtocol {
    shutdown: broadcast::Sender<()>,
    follower: JoinHandle<()>,
    pump: JoinHandle<()>,
    endpoint: Arc<dyn BinaryNetworkEndpoint>,
}

struct ManagedOracleState {
    args: OracleArgs,
    telemetry: mpsc::Sender<TelemetryEvent>,
    config_digest: ConfigDigest,
    running: Option<RunningProtocol>,
}

async fn run_managed_oracle(
    args: OracleArgs,
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // Child receivers are subscribed before the first await so no shutdown
    // signal sent after start can slip past them. The handle keeps the only
    // other sender; dropping ours lets every task notice an abandoned handle.
    let shutdown_telemetry = shutdown.subscribe();
    let shutdown_tracker = shutdown.subscribe();
    let shutdown_gc = shutdown.subscribe();
    drop(shutdown);

    let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_QUEUE_CAPACITY);
    let mut state = ManagedOracleState {
        args,
        telemetry: telemetry_tx,
        config_digest: ConfigDigest::ZERO,
        running: None,
    };

    // Restore the last known config from the database, so the oracle can
    // come up even while the chain is unreachable.
    if let Some(cc) = state.restore_config().await {
        state.config_changed(cc).await;
    }

    let telemetry_task = tokio::spawn(forward_telemetry(
        state.args.monitoring_endpoint.clone(),
        telemetry_rx,
        shutdown_telemetry,
    ));

    let (new_config_tx, mut new_config_rx) = mpsc::channel(CONFIG_QUEUE_CAPACITY);
    let tracker_task = tokio::spawn(track_config(
        Arc::clone(&state.args.config_tracker),
        state.config_digest,
        state.args.local_config.clone(),
        new_config_tx,
        shutdown_tracker,
    ));

    let gc_task = tokio::spawn(collect_garbage(
        Arc::clone(&state.args.database),
        state.args.local_config.clone(),
        shutdown_gc,
    ));

    loop {
        tokio::select! {
            Some(change) = new_config_rx.recv() => {
                info!(
                    old_config_digest = %state.config_digest,
                    new_config_digest = %change.config_digest,
                    "managed oracle: switching between configs"
                );
                state.config_changed(change).await;
            }
            _ = shutdown_rx.recv() => {
                info!("managed oracle: winding down");
                state.close_protocol().await;
                let _ = telemetry_task.await;
                let _ = tracker_task.await;
                let _ = gc_task.await;
                info!("managed oracle: exiting");
                return;
            }
        }
    }
}

impl ManagedOracleState {
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
                    "managed oracle: database timed out while restoring configuration"
                );
                None
            }
            Some(Err(e)) => {
                error!(error = %e, "managed oracle: error reading configuration from database");
                None
            }
            Some(Ok(None)) => {
                info!("managed oracle: no configuration to restore");
                None
            }
            Some(Ok(Some(cc))) => Some(cc),
        }
    }

    /// Tear down any running instance and bring the protocol up under the
    /// new configuration.
    async fn config_changed(&mut self, contract_config: ContractConfig) {
        // Cease all operation from earlier configs before anything else
        self.close_protocol().await;

        let decoded = SharedConfig::from_contract_config(
            &contract_config,
            &*self.args.private_keys,
            &self.args.net_endpoint_factory.peer_id(),
            self.args.contract_transmitter.from_address(),
        );
        let (config, oracle_id) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "managed oracle: error while decoding configuration");
                return;
            }
        };
        let config = Arc::new(config);

        let peer_ids: Vec<String> = config
            .public
            .oracle_identities
            .iter()
            .map(|identity| identity.peer_id.clone())
            .collect();

        let endpoint = match self
            .args
            .net_endpoint_factory
            .make_endpoint(
                config.public.config_digest,
                peer_ids,
                self.args.bootstrappers.clone(),
                config.public.f,
                compute_token_bucket_refill_rate(&config.public),
                compute_token_bucket_size(),
            )
            .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!(
                    config_digest = %config.public.config_digest,
                    error = %e,
                    "managed oracle: error during make_endpoint"
                );
                return;
            }
        };

        if let Err(e) = endpoint.start().await {
            error!(
                config_digest = %config.public.config_digest,
                error = %e,
                "managed oracle: error starting endpoint"
            );
            return;
        }

        // The protocol subtree gets its own cancellation root so a config
        // change never touches the supervisor's other tasks.
        let (protocol_shutdown, _) = broadcast::channel(1);
        let pump_shutdown = protocol_shutdown.subscribe();
        let follower_shutdown = protocol_shutdown.subscribe();

        let (inbound_tx, inbound_rx) = mpsc::channel::<MessageWithSender>(INBOUND_QUEUE_CAPACITY);
        let pump = tokio::spawn(pump_inbound(
            Arc::clone(&endpoint),
            inbound_tx,
            pump_shutdown,
        ));

        let follower = ReportGenerationFollower::new(
            Arc::clone(&config),
            oracle_id,
            INITIAL_EPOCH,
            self.args.local_config.clone(),
            Arc::clone(&self.args.datasource),
            Arc::clone(&self.args.contract_transmitter),
            Arc::clone(&self.args.private_keys),
            Arc::new(SerializingEndpoint::new(Arc::clone(&endpoint))),
            Arc::new(ChannelTelemetrySender::new(self.telemetry.clone())),
            inbound_rx,
            self.args.to_pacemaker.clone(),
            self.args.to_transmission.clone(),
            follower_shutdown,
        );
        let follower = tokio::spawn(follower.run());

        self.running = Some(RunningProtocol {
            shutdown: protocol_shutdown,
            follower,
            pump,
            endpoint,
        });
        self.config_digest = contract_config.config_digest;

        // Best-effort persistence: the live protocol continues even if the
        // database is down.
        let database = Arc::clone(&self.args.database);
        let to_store = contract_config.clone();
        let stored = detach_timeout(self.args.local_config.database_timeout, async move {
            database.write_config(to_store).await
        })
        .await;
        match stored {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!(
                    config_digest = %self.config_digest,
                    error = %e,
                    "managed oracle: error writing new config to database"
                );
            }
            None => {
                error!(
                    config_digest = %self.config_digest,
                    "managed oracle: database timed out writing new config"
                );
            }
        }
    }

    /// Cancel the protocol subtree, wait for its tasks, then close the
    /// endpoint. Only after all of that are the references dropped.
    async fn close_protocol(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            let _ = running.follower.await;
            let _ = running.pump.await;
            if let Err(e) = running.endpoint.close().await {
                // Nothing to be done about it, carry on
                error!(error = %e, "managed oracle: error while closing endpoint");
            }
        }
    }
}

/// Outbound message budget per second, doubled for safety: one resend, one
/// progress report, and the observe/report/echo traffic of a round.
fn compute_token_bucket_refill_rate(config: &PublicConfig) -> f64 {
    let per_second = |d: std::time::Duration| 1.0 / d.as_secs_f64();
    2.0 * (per_second(config.delta_resend)
        + per_second(config.delta_progress)
        + per_second(config.delta_round)
        + 3.0 * per_second(config.delta_round)
        + 2.0 * per_second(config.delta_round))
}

fn compute_token_bucket_size() -> usize {
    (2 + 6) * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_with_deltas(resend: u64, progress: u64, round: u64) -> PublicConfig {
        PublicConfig {
            config_digest: ConfigDigest::ZERO,
            oracle_identities: Vec::new(),
            f: 1,
            r_max: 10,
            alpha_ppb: 0,
            delta_resend: Duration::from_secs(resend),
            delta_progress: Duration::from_secs(progress),
            delta_round: Duration::from_secs(round),
            delta_c: Duration::from_secs(1),
        }
    }

    #[test]
    fn token_bucket_size_is_fixed() {
        assert_eq!(compute_token_bucket_size(), 16);
    }

    #[test]
    fn token_bucket_refill_rate() {
        // 2 * (1/10 + 1/20 + 6/30) = 0.7
        let config = config_with_deltas(10, 20, 30);
        let rate = compute_token_bucket_refill_rate(&config);
        assert!((rate - 0.7).abs() < 1e-9);
    }
}
