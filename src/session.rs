//! Session Store (C3): per-(platform, user) binding state.

use std::collections::HashMap;

use chrono::Duration;
use tokio::sync::RwLock;

use crate::model::{Platform, Session};

/// Thread-safe store of [`Session`]s keyed by `(platform, user_id)`.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<(Platform, String), Session>>,
}

impl SessionStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for `(platform, user_id)`, creating it if absent,
    /// and refresh `last_chat_id`/`last_active` on every call.
    pub async fn get_or_create(&self, platform: Platform, user_id: &str, chat_id: &str) -> Session {
        let key = (platform, user_id.to_owned());
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key)
            .or_insert_with(|| Session::new(platform, user_id.to_owned(), chat_id.to_owned()));
        session.touch(chat_id);
        session.clone()
    }

    /// Bind `(platform, user_id)` to `process_name`, independent of chat.
    pub async fn bind(&self, platform: Platform, user_id: &str, process_name: &str) {
        let key = (platform, user_id.to_owned());
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key)
            .or_insert_with(|| Session::new(platform, user_id.to_owned(), String::new()));
        session.bound_process = Some(process_name.to_owned());
    }

    /// Clear the binding for `(platform, user_id)`.
    pub async fn unbind(&self, platform: Platform, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&(platform, user_id.to_owned())) {
            session.bound_process = None;
        }
    }

    /// Fetch the bound process name for `(platform, user_id)`, if any.
    pub async fn get_bound(&self, platform: Platform, user_id: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(&(platform, user_id.to_owned()))
            .and_then(|s| s.bound_process.clone())
    }

    /// Remove sessions idle longer than `max_age`.
    pub async fn cleanup(&self, max_age: Duration) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| !session.is_stale(max_age));
    }

    /// Count of live sessions, reported in the shutdown notice.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_refreshes_chat_id_every_call() {
        let store = SessionStore::new();
        store.get_or_create(Platform::Telegram, "u1", "c1").await;
        let session = store.get_or_create(Platform::Telegram, "u1", "c2").await;
        assert_eq!(session.last_chat_id, "c2");
    }

    #[tokio::test]
    async fn bind_is_idempotent() {
        let store = SessionStore::new();
        store.bind(Platform::Telegram, "u1", "api").await;
        store.bind(Platform::Telegram, "u1", "api").await;
        assert_eq!(
            store.get_bound(Platform::Telegram, "u1").await,
            Some("api".to_owned())
        );
    }

    #[tokio::test]
    async fn unbind_clears_binding() {
        let store = SessionStore::new();
        store.bind(Platform::Telegram, "u1", "api").await;
        store.unbind(Platform::Telegram, "u1").await;
        assert_eq!(store.get_bound(Platform::Telegram, "u1").await, None);
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_sessions() {
        let store = SessionStore::new();
        store.get_or_create(Platform::Telegram, "u1", "c1").await;
        {
            let mut sessions = store.sessions.write().await;
            if let Some(s) = sessions.get_mut(&(Platform::Telegram, "u1".to_owned())) {
                s.last_active = chrono::Utc::now() - Duration::hours(25);
            }
        }
        store.cleanup(Duration::hours(24)).await;
        assert!(store.get_bound(Platform::Telegram, "u1").await.is_none());
        assert!(store
            .sessions
            .read()
            .await
            .get(&(Platform::Telegram, "u1".to_owned()))
            .is_none());
    }
}
