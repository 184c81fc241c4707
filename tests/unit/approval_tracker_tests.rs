//! Unit tests for the pending-approval tracker's id/message-id invariant.

use bot_gateway::approval::ApprovalTracker;
use bot_gateway::model::{Platform, PendingApproval, ReplyContext};

fn reply_context() -> ReplyContext {
    ReplyContext {
        platform: Platform::Telegram,
        chat_id: "C1".into(),
        message_id: None,
        thread_id: None,
    }
}

#[tokio::test]
async fn get_by_message_matches_id_lookup_while_pending() {
    let tracker = ApprovalTracker::new();
    let approval = PendingApproval::new("A1".into(), "p1".into(), reply_context(), Some("M42".into()), 0);
    tracker.add(approval.clone()).await;

    assert_eq!(tracker.get("A1").await, Some(approval.clone()));
    assert_eq!(tracker.get_by_message("M42").await, Some(approval));
}

#[tokio::test]
async fn remove_clears_both_indexes() {
    let tracker = ApprovalTracker::new();
    let approval = PendingApproval::new("A1".into(), "p1".into(), reply_context(), Some("M42".into()), 0);
    tracker.add(approval).await;
    tracker.remove("A1").await;

    assert!(tracker.get("A1").await.is_none());
    assert!(tracker.get_by_message("M42").await.is_none());
}

#[tokio::test]
async fn cleanup_evicts_only_expired_entries() {
    let tracker = ApprovalTracker::new();
    let mut expired = PendingApproval::new("A1".into(), "p1".into(), reply_context(), None, 1);
    expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
    let live = PendingApproval::new("A2".into(), "p1".into(), reply_context(), None, 0);
    tracker.add(expired).await;
    tracker.add(live).await;

    tracker.cleanup().await;

    assert!(tracker.get("A1").await.is_none());
    assert!(tracker.get("A2").await.is_some());
}
