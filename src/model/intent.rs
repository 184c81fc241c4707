//! Structured meaning extracted from a free-form chat utterance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which of the nine intent kinds a message was parsed into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Show the help card.
    Help,
    /// List all registered processes.
    QueryList,
    /// Show status/logs/errors for a target.
    QueryStatus,
    /// Pause/resume/cancel/stop a target.
    Control,
    /// Bind the session to a target.
    Bind,
    /// Forward free-text task to a target.
    SendTask,
    /// Approve or reject a pending approval.
    Approve,
    /// Recognized but not actionable without further wiring.
    Subscribe,
    /// Did not match any pattern.
    Unknown,
}

/// The structured meaning extracted from an [`crate::model::InboundMessage`]
/// by the Intent Parser (§4.5). A flat carrier of optional fields rather than
/// an enum of per-variant payloads, matching the wire `ParsedIntent` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Intent {
    /// Which kind of intent this is.
    pub kind: IntentKind,
    /// Process selector, when the utterance named one.
    pub target: Option<String>,
    /// Free verb for `Control`/`QueryStatus` (`pause|resume|cancel|stop|logs|errors`).
    pub action: Option<String>,
    /// Free-text task body, for `SendTask`.
    pub task: Option<String>,
    /// Named parameters, e.g. `limit` for `logs <n>`.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Tri-state approval answer: `Some(true)`, `Some(false)`, or unset.
    pub approved: Option<bool>,
    /// The original, unmodified message text.
    pub raw: String,
}

impl Intent {
    /// Construct an intent carrying only `kind` and the raw text.
    #[must_use]
    pub fn new(kind: IntentKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            target: None,
            action: None,
            task: None,
            params: HashMap::new(),
            approved: None,
            raw: raw.into(),
        }
    }

    /// Builder-style target setter.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Builder-style action setter.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Builder-style task setter.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Builder-style single-param setter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Builder-style approved setter.
    #[must_use]
    pub const fn with_approved(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }
}
