//! Watching the contract for configuration changes.

use std::sync::Arc;

use oraclecore_core::{ConfigDigest, ContractConfig, ContractConfigTracker, LocalConfig};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Poll and subscribe for configuration changes, delivering each new
/// configuration exactly once onto `found_configs`.
///
/// Changes are deduplicated by digest against `initial_digest` and
/// everything already delivered. The delivery send *blocks* when the queue
/// is full: a configuration change may be delayed but must never be lost.
pub async fn track_config(
    tracker: Arc<dyn ContractConfigTracker>,
    initial_digest: ConfigDigest,
    local_config: LocalConfig,
    found_configs: mpsc::Sender<ContractConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut latest = initial_digest;
    let mut subscription = match tracker.subscribe_new_configs().await {
        Ok(rx) => Some(rx),
        Err(e) => {
            warn!(error = %e, "config subscription unavailable, relying on polling");
            None
        }
    };

    let mut poll = tokio::time::interval(local_config.contract_config_tracker_poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let found = tokio::select! {
            _ = shutdown.recv() => {
                debug!("config tracker winding down");
                return;
            }
            pushed = next_pushed(&mut subscription) => {
                match pushed {
                    Some(cc) => Some(cc),
                    None => {
                        warn!("config subscription ended, relying on polling");
                        subscription = None;
                        continue;
                    }
                }
            }
            _ = poll.tick() => poll_latest(&*tracker, latest).await,
        };

        let Some(change) = found else { continue };
        if change.config_digest == latest {
            debug!(config_digest = %latest, "ignoring already-tracked configuration");
            continue;
        }
        latest = change.config_digest;
        info!(config_digest = %latest, "found changed configuration");

        tokio::select! {
            delivered = found_configs.send(change) => {
                if delivered.is_err() {
                    debug!("config channel closed, tracker exiting");
                    return;
                }
            }
            _ = shutdown.recv() => {
                debug!("config tracker winding down");
                return;
            }
        }
    }
}

async fn next_pushed(
    subscription: &mut Option<mpsc::Receiver<ContractConfig>>,
) -> Option<ContractConfig> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_latest(
    tracker: &dyn ContractConfigTracker,
    latest: ConfigDigest,
) -> Option<ContractConfig> {
    let (_change_block, digest) = match tracker.latest_config_details().await {
        Ok(details) => details,
        Err(e) => {
            warn!(error = %e, "failed to fetch latest config details");
            return None;
        }
    };
    if digest == latest || digest == ConfigDigest::ZERO {
        return None;
    }
    match tracker.config_from_logs(digest).await {
        Ok(cc) => Some(cc),
        Err(e) => {
            warn!(config_digest = %digest, error = %e, "failed to fetch config from logs");
            None
        }
    }
}
