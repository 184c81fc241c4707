//! Wire frames exchanged between the gateway and worker processes (§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::button::Button;
use crate::model::intent::Intent;
use crate::model::message::MessageFormat;
use crate::model::platform::Platform;
use crate::model::process::ProcessStatus;

/// The `type` discriminant of an [`IpcFrame`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IpcMessageType {
    /// worker -> gateway: first frame on every connection.
    Register,
    /// worker -> gateway: graceful disconnect notice.
    Unregister,
    /// worker -> gateway: liveness + status update.
    Heartbeat,
    /// worker -> gateway: fire-and-forget notice for the default chat.
    Notification,
    /// worker -> gateway: request for a human yes/no.
    Approval,
    /// gateway -> worker: resolution of a pending approval.
    ApprovalResponse,
    /// gateway -> worker: dispatch a parsed intent.
    Command,
    /// worker -> gateway: result of a dispatched command.
    Response,
}

/// One newline-delimited JSON frame on the IPC wire.
///
/// `payload` is kept as a generic [`Value`] at the transport layer; callers
/// deserialize it into the payload type matching `msg_type` once decoded.
/// Unknown fields inside a payload are ignored by receivers (forward-compat).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcFrame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub msg_type: IpcMessageType,
    /// Correlates a request with its eventual response, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Frame-specific payload.
    pub payload: Value,
}

impl IpcFrame {
    /// Construct a frame, serializing `payload` into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `payload` cannot be represented as JSON.
    pub fn new<P: Serialize>(
        msg_type: IpcMessageType,
        request_id: Option<String>,
        payload: &P,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            msg_type,
            request_id,
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// `register` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RegisterPayload {
    /// Opaque per-connection identifier.
    pub process_id: String,
    /// Workspace path this process represents.
    pub process_path: String,
    /// Optional callback socket for the worker, if it exposes one.
    #[serde(default)]
    pub socket_path: Option<String>,
    /// OS process ID.
    pub pid: u32,
}

/// `heartbeat` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HeartbeatPayload {
    /// Process sending the heartbeat.
    pub process_id: String,
    /// Current lifecycle status.
    pub status: ProcessStatus,
    /// Free-text description of in-flight work.
    #[serde(default)]
    pub current_task: Option<String>,
    /// Optional memory usage in bytes, logged but not acted on.
    #[serde(default)]
    pub memory: Option<u64>,
}

/// Severity of a worker [`NotificationPayload`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational, suppressible during quiet hours.
    Info,
    /// Warning, suppressible during quiet hours.
    Warning,
    /// Error, never suppressed.
    Error,
    /// Success, suppressible during quiet hours.
    Success,
}

impl NotificationLevel {
    /// Icon used when rendering the notification (§4.7).
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Info => "\u{2139}\u{fe0f}",
            Self::Warning => "\u{26a0}\u{fe0f}",
            Self::Error => "\u{1f534}",
            Self::Success => "\u{2705}",
        }
    }
}

/// `notification` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotificationPayload {
    /// Severity.
    pub level: NotificationLevel,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Optional buttons to attach.
    #[serde(default)]
    pub buttons: Option<Vec<Button>>,
}

/// `approval` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalPayload {
    /// Approval ID, unique across all live approvals.
    pub id: String,
    /// Short action name shown in the title.
    pub action: String,
    /// Human-readable description.
    pub description: String,
    /// Optional extra detail rendered as a fenced block.
    #[serde(default)]
    pub details: Option<String>,
    /// Relative timeout in seconds; absent or zero means no timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// `approval_response` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalResponsePayload {
    /// Echoes the approval ID that was resolved.
    pub request_id: String,
    /// Whether the approval was granted.
    pub approved: bool,
    /// Optional free-text comment from the responder.
    #[serde(default)]
    pub comment: Option<String>,
    /// User who resolved the approval.
    pub user_id: String,
}

/// Identifies the user who triggered a dispatched [`CommandPayload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandUser {
    /// Platform-scoped user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Originating platform.
    pub platform: Platform,
}

/// Where a worker's eventual [`ResponsePayload`] should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandReplyTo {
    /// Originating platform.
    pub platform: Platform,
    /// Chat to reply into.
    pub chat_id: String,
    /// Message being replied to, if any.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Thread to reply into, if any.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// `command` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandPayload {
    /// The parsed intent being dispatched.
    pub intent: Intent,
    /// User who issued the command.
    pub user: CommandUser,
    /// Where a response should be routed.
    pub reply_to: CommandReplyTo,
}

/// `response` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ResponsePayload {
    /// Whether the worker considers the command successful.
    pub success: bool,
    /// Message text.
    pub message: String,
    /// Optional rendering hint, defaults to markdown when absent.
    #[serde(default)]
    pub format: Option<MessageFormat>,
    /// Optional structured payload for `handle_process_response` hooks.
    #[serde(default)]
    pub data: Option<Value>,
    /// Optional buttons to attach.
    #[serde(default)]
    pub buttons: Option<Vec<Button>>,
}
