//! Approval Tracker (C4): pending approvals indexed by ID and by message.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::model::PendingApproval;

/// Thread-safe tracker keeping `id -> PendingApproval` and
/// `message_id -> id` in lockstep (§4.4, §8 invariant 1).
#[derive(Debug, Default)]
pub struct ApprovalTracker {
    by_id: RwLock<HashMap<String, PendingApproval>>,
    by_message: RwLock<HashMap<String, String>>,
}

impl ApprovalTracker {
    /// Construct an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending approval, indexing it by message-ID too if one
    /// was supplied.
    pub async fn add(&self, approval: PendingApproval) {
        if let Some(message_id) = approval.message_id.clone() {
            self.by_message
                .write()
                .await
                .insert(message_id, approval.id.clone());
        }
        self.by_id.write().await.insert(approval.id.clone(), approval);
    }

    /// Fetch a pending approval by ID.
    pub async fn get(&self, id: &str) -> Option<PendingApproval> {
        self.by_id.read().await.get(id).cloned()
    }

    /// Fetch a pending approval by the chat-message-ID carrying its buttons.
    pub async fn get_by_message(&self, message_id: &str) -> Option<PendingApproval> {
        let id = self.by_message.read().await.get(message_id)?.clone();
        self.by_id.read().await.get(&id).cloned()
    }

    /// Remove a pending approval, clearing both indexes.
    pub async fn remove(&self, id: &str) -> Option<PendingApproval> {
        let removed = self.by_id.write().await.remove(id)?;
        if let Some(message_id) = &removed.message_id {
            self.by_message.write().await.remove(message_id);
        }
        Some(removed)
    }

    /// Count of pending approvals, reported in the shutdown notice.
    pub async fn count(&self) -> usize {
        self.by_id.read().await.len()
    }

    /// Evict every approval whose timeout has passed.
    pub async fn cleanup(&self) {
        let expired_ids: Vec<String> = self
            .by_id
            .read()
            .await
            .values()
            .filter(|a| a.is_expired())
            .map(|a| a.id.clone())
            .collect();
        for id in expired_ids {
            self.remove(&id).await;
        }
    }
}
