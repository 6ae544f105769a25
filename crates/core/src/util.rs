//! Small async utilities.

use std::future::Future;
use std::time::Duration;

/// Run `fut` for at most `limit`, detaching it on timeout.
///
/// Collaborator implementations may ignore cancellation, so the future is
/// spawned onto its own task and raced against a timer. On timeout the
/// caller proceeds immediately and the outstanding task keeps running in
/// the background; its eventual result is discarded.
///
/// Returns `None` on timeout (or if the spawned task panicked).
pub async fn detach_timeout<T, F>(limit: Duration, fut: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(_join_error)) => None,
        Err(_elapsed) => None,
    }
}
