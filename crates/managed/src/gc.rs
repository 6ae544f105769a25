//! Periodic database garbage collection.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use oraclecore_core::{detach_timeout, Database, LocalConfig};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How often the sweeper runs.
const COLLECT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Records older than this are eligible for pruning.
const MAX_RECORD_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Periodically invoke the database's GC hook.
pub(crate) async fn collect_garbage(
    database: Arc<dyn Database>,
    local_config: LocalConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = tokio::time::interval(COLLECT_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let cutoff = SystemTime::now() - MAX_RECORD_AGE;
                let database = Arc::clone(&database);
                let result = detach_timeout(local_config.database_timeout, async move {
                    database.collect_garbage(cutoff).await
                })
                .await;
                match result {
                    Some(Ok(())) => debug!("database garbage collection done"),
                    Some(Err(e)) => warn!(error = %e, "database garbage collection failed"),
                    None => warn!("database timed out during garbage collection"),
                }
            }
            _ = shutdown.recv() => {
                debug!("garbage collector winding down");
                return;
            }
        }
    }
}
