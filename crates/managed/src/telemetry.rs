//! Telemetry plumbing.
//!
//! Protocol tasks record events through [`ChannelTelemetrySender`], which
//! drops on a full queue rather than block - monitoring is best-effort. A
//! single [`forward_telemetry`] task per supervisor drains the queue,
//! serializes each record and ships it to the monitoring endpoint.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use oraclecore_core::{ConfigDigest, MonitoringEndpoint, OracleId};
use oraclecore_protocol::{TelemetryEvent, TelemetrySender};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// Non-blocking telemetry sender backed by a bounded queue.
#[derive(Clone)]
pub struct ChannelTelemetrySender {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl ChannelTelemetrySender {
    /// Wrap the supervisor's telemetry queue.
    pub fn new(tx: mpsc::Sender<TelemetryEvent>) -> Self {
        Self { tx }
    }
}

impl TelemetrySender for ChannelTelemetrySender {
    fn round_started(&self, config_digest: ConfigDigest, epoch: u32, round: u8, leader: OracleId) {
        let event = TelemetryEvent::RoundStarted {
            config_digest,
            epoch,
            round,
            leader,
            time_unix_ms: unix_millis(),
        };
        if self.tx.try_send(event).is_err() {
            debug!("telemetry queue full, dropping round-started record");
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Drain telemetry records and forward them to the monitoring endpoint.
pub async fn forward_telemetry(
    monitoring_endpoint: Option<Arc<dyn MonitoringEndpoint>>,
    mut records: mpsc::Receiver<TelemetryEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else {
                    // All senders dropped; nothing more will arrive
                    debug!("telemetry queue closed, forwarder exiting");
                    return;
                };
                let bytes = match serde_json::to_vec(&record) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(error = %e, "failed to serialize telemetry record");
                        continue;
                    }
                };
                if let Some(endpoint) = &monitoring_endpoint {
                    endpoint.send_log(bytes);
                }
            }
            _ = shutdown.recv() => {
                info!("telemetry forwarder exiting");
                return;
            }
        }
    }
}
