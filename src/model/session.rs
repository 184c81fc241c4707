//! Per-(platform, user) binding state owned by the Session Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::platform::Platform;

/// Per-(platform, user-ID) record tracking the user's bound worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Platform this session lives on.
    pub platform: Platform,
    /// User-ID on that platform.
    pub user_id: String,
    /// Most recently seen chat-ID, updated opportunistically.
    pub last_chat_id: String,
    /// Bound process name, empty if unbound.
    pub bound_process: Option<String>,
    /// Timestamp of the last activity seen for this session.
    pub last_active: DateTime<Utc>,
}

impl Session {
    /// Construct a newly seen session for `(platform, user_id)`.
    #[must_use]
    pub fn new(platform: Platform, user_id: String, chat_id: String) -> Self {
        Self {
            platform,
            user_id,
            last_chat_id: chat_id,
            bound_process: None,
            last_active: Utc::now(),
        }
    }

    /// Refresh `last_chat_id` and `last_active`, as every inbound message does.
    pub fn touch(&mut self, chat_id: &str) {
        self.last_chat_id = chat_id.to_owned();
        self.last_active = Utc::now();
    }

    /// Whether this session has been idle longer than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.last_active) > max_age
    }
}
