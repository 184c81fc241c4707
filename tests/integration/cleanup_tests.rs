//! Cleanup loop wired against a live Registry/SessionStore/ApprovalTracker,
//! exercising the stale-reap boundary end to end rather than in isolation.

use std::sync::Arc;
use std::time::Duration;

use bot_gateway::approval::ApprovalTracker;
use bot_gateway::cleanup;
use bot_gateway::model::ProcessInfo;
use bot_gateway::registry::Registry;
use bot_gateway::session::SessionStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cleanup_tick_reaps_only_processes_older_than_the_stale_threshold() {
    let registry = Arc::new(Registry::new());
    let sessions = Arc::new(SessionStore::new());
    let approvals = Arc::new(ApprovalTracker::new());

    let mut stale = ProcessInfo::new("stale".into(), "/srv/stale".into(), 1);
    stale.last_seen = Utc::now() - chrono::Duration::seconds(31);
    registry.register(stale).await;

    let mut fresh = ProcessInfo::new("fresh".into(), "/srv/fresh".into(), 2);
    fresh.last_seen = Utc::now() - chrono::Duration::seconds(5);
    registry.register(fresh).await;

    let cancel = CancellationToken::new();
    let handle = cleanup::spawn(
        Arc::clone(&registry),
        Arc::clone(&sessions),
        Arc::clone(&approvals),
        Duration::from_millis(20),
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let _ = handle.await;

    assert!(registry.find("stale").await.is_none());
    assert!(registry.find("fresh").await.is_some());
}
