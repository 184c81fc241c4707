//! Pending approval records owned by the Approval Tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::message::ReplyContext;

/// One outstanding approval request correlated between a worker and a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PendingApproval {
    /// Approval ID, supplied by the worker; unique across all live approvals.
    pub id: String,
    /// Process that requested the approval.
    pub process_id: String,
    /// Platform/chat/thread/message context of the original request message.
    pub reply_context: ReplyContext,
    /// Chat-message-ID carrying the approve/reject buttons, if posted.
    pub message_id: Option<String>,
    /// When the approval was recorded.
    pub created_at: DateTime<Utc>,
    /// Absolute expiry instant; `None` means no timeout.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingApproval {
    /// Construct a pending approval with an optional relative timeout in seconds.
    #[must_use]
    pub fn new(
        id: String,
        process_id: String,
        reply_context: ReplyContext,
        message_id: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let created_at = Utc::now();
        let expires_at = (timeout_secs > 0)
            .then(|| created_at + chrono::Duration::seconds(i64::try_from(timeout_secs).unwrap_or(i64::MAX)));
        Self {
            id,
            process_id,
            reply_context,
            message_id,
            created_at,
            expires_at,
        }
    }

    /// Whether this approval has passed its timeout.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}
