//! Process Registry (C2): the set of currently connected worker processes.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::process::basename;
use crate::model::{ProcessInfo, ProcessStatus};

/// Thread-safe registry of connected worker processes, keyed by `process_id`
/// and discoverable by alias, basename, or full workspace path (§4.2).
#[derive(Debug, Default)]
pub struct Registry {
    processes: RwLock<HashMap<String, ProcessInfo>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl Registry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `process.process_id`. If an alias in
    /// the configured map resolves to this process's workspace path, the
    /// process's `alias` field is set.
    pub async fn register(&self, mut process: ProcessInfo) {
        let resolved_alias = {
            let aliases = self.aliases.read().await;
            aliases
                .iter()
                .find(|(_, path)| path.as_str() == process.workspace_path.to_string_lossy())
                .map(|(alias, _)| alias.clone())
        };
        if let Some(alias) = resolved_alias {
            process.alias = Some(alias);
        }
        let process_id = process.process_id.clone();
        let mut processes = self.processes.write().await;
        if processes.contains_key(&process_id) {
            info!(process_id = %process_id, "duplicate register, replacing prior connection");
        }
        processes.insert(process_id, process);
    }

    /// Remove `process_id`, returning the removed entry if it existed.
    pub async fn unregister(&self, process_id: &str) -> Option<ProcessInfo> {
        self.processes.write().await.remove(process_id)
    }

    /// Case-insensitive lookup tried in order: exact process-ID, alias,
    /// basename of path, full path. Returns at most one match.
    pub async fn find(&self, query: &str) -> Option<ProcessInfo> {
        let needle = query.to_lowercase();
        let processes = self.processes.read().await;
        processes
            .values()
            .find(|p| p.process_id.to_lowercase() == needle)
            .or_else(|| {
                processes.values().find(|p| {
                    p.alias
                        .as_ref()
                        .is_some_and(|alias| alias.to_lowercase() == needle)
                })
            })
            .or_else(|| {
                processes
                    .values()
                    .find(|p| p.name().to_lowercase() == needle)
            })
            .or_else(|| {
                processes
                    .values()
                    .find(|p| p.workspace_path.to_string_lossy().to_lowercase() == needle)
            })
            .cloned()
    }

    /// Snapshot of all live processes.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        self.processes.read().await.values().cloned().collect()
    }

    /// Update `process_id`'s status and current task, refreshing `last_seen`.
    pub async fn update_status(
        &self,
        process_id: &str,
        status: ProcessStatus,
        current_task: Option<String>,
    ) {
        let mut processes = self.processes.write().await;
        if let Some(process) = processes.get_mut(process_id) {
            process.status = status;
            process.current_task = current_task;
            process.last_seen = Utc::now();
        }
    }

    /// Refresh `last_seen` for a heartbeat that carries no status change.
    pub async fn touch(&self, process_id: &str) {
        let mut processes = self.processes.write().await;
        if let Some(process) = processes.get_mut(process_id) {
            process.last_seen = Utc::now();
        }
    }

    /// Remove entries whose `last_seen` is older than `threshold`, returning
    /// the display names of the processes removed.
    pub async fn cleanup_stale(&self, threshold: chrono::Duration) -> Vec<String> {
        let mut processes = self.processes.write().await;
        let now = Utc::now();
        let stale_ids: Vec<String> = processes
            .iter()
            .filter(|(_, p)| now.signed_duration_since(p.last_seen) > threshold)
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed_names = Vec::with_capacity(stale_ids.len());
        for id in stale_ids {
            if let Some(process) = processes.remove(&id) {
                removed_names.push(process.display_name());
            }
        }
        removed_names
    }

    /// Add or update an alias binding, re-deriving the alias on any existing
    /// process whose workspace path matches.
    pub async fn set_alias(&self, alias: &str, path: &Path) {
        {
            let mut aliases = self.aliases.write().await;
            aliases.insert(alias.to_owned(), path.to_string_lossy().into_owned());
        }
        let mut processes = self.processes.write().await;
        for process in processes.values_mut() {
            if process.workspace_path == path {
                process.alias = Some(alias.to_owned());
            }
        }
    }
}
