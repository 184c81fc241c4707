//! Cleanup Loop (C8): periodic janitor for stale workers, sessions, and
//! expired approvals.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::approval::ApprovalTracker;
use crate::registry::Registry;
use crate::session::SessionStore;

const STALE_THRESHOLD: Duration = Duration::seconds(30);
const SESSION_MAX_AGE: Duration = Duration::hours(24);

/// Spawn the cleanup-loop background task (§4.8).
///
/// Ticks every `interval`, pruning stale processes from `registry`, stale
/// sessions from `sessions`, and expired approvals from `approvals`. These
/// sweeps are advisory; any component may also prune opportunistically.
#[must_use]
pub fn spawn(
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    approvals: Arc<ApprovalTracker>,
    interval: StdDuration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("cleanup loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = registry.cleanup_stale(STALE_THRESHOLD).await;
                    if !removed.is_empty() {
                        info!(removed = ?removed, "reaped stale processes");
                    }
                    sessions.cleanup(SESSION_MAX_AGE).await;
                    approvals.cleanup().await;
                }
            }
        }
    })
}
