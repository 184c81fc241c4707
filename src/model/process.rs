//! Connected worker process records owned by the Process Registry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status reported by a worker's `heartbeat` frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Not currently executing a task.
    Idle,
    /// Actively executing a task.
    Busy,
    /// Last reported operation failed.
    Error,
}

impl ProcessStatus {
    /// Emoji used when rendering `QueryList` (§4.7).
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Idle => "\u{1f7e2}",
            Self::Busy => "\u{1f7e1}",
            Self::Error => "\u{1f534}",
        }
    }
}

/// One connected worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    /// Opaque identifier, unique per live connection.
    pub process_id: String,
    /// Workspace path the worker represents.
    pub workspace_path: PathBuf,
    /// OS process ID reported at register time.
    pub pid: u32,
    /// Optional alias resolved from the configured alias map.
    pub alias: Option<String>,
    /// Current lifecycle status.
    pub status: ProcessStatus,
    /// Free-text description of the in-flight task, if any.
    pub current_task: Option<String>,
    /// When this connection registered.
    pub start_time: DateTime<Utc>,
    /// Timestamp of the most recent heartbeat or register.
    pub last_seen: DateTime<Utc>,
}

impl ProcessInfo {
    /// Construct a freshly registered process record.
    #[must_use]
    pub fn new(process_id: String, workspace_path: PathBuf, pid: u32) -> Self {
        let now = Utc::now();
        Self {
            process_id,
            workspace_path,
            pid,
            alias: None,
            status: ProcessStatus::Idle,
            current_task: None,
            start_time: now,
            last_seen: now,
        }
    }

    /// Basename of `workspace_path`, used as the display name and as one of
    /// the Registry's lookup keys.
    #[must_use]
    pub fn name(&self) -> String {
        basename(&self.workspace_path)
    }

    /// Display name: `alias (name)` when an alias is set, else just `name`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.name();
        match &self.alias {
            Some(alias) => format!("{alias} ({name})"),
            None => name,
        }
    }
}

/// Extract the final path component as a lossy UTF-8 string.
#[must_use]
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|os| os.to_string_lossy().into_owned())
        .unwrap_or_default()
}
