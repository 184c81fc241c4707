//! Canonical inbound/outbound chat message shapes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::button::Button;
use crate::model::platform::Platform;

/// Rendering hint for an [`OutboundMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Render as platform-native markdown when the platform supports it.
    #[default]
    Markdown,
    /// Render as plain text.
    Plain,
}

/// One user utterance as emitted by a platform adapter. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct InboundMessage {
    /// Platform-scoped message identifier.
    pub message_id: String,
    /// Originating platform.
    pub platform: Platform,
    /// Chat the message arrived in.
    pub chat_id: String,
    /// Thread identifier, if the platform supports threads.
    pub thread_id: Option<String>,
    /// Sending user's platform-scoped ID.
    pub user_id: String,
    /// Sending user's display name.
    pub user_name: String,
    /// Raw textual content, already stripped of a resolved `@botname` prefix.
    pub content: String,
    /// Message-ID this message replies to, if any.
    pub reply_to: Option<String>,
    /// When the adapter received the message.
    pub timestamp: DateTime<Utc>,
    /// Whether the bot was explicitly mentioned.
    pub is_mention: bool,
    /// Whether this arrived over a 1:1 direct-message channel.
    pub is_direct_message: bool,
    /// Adapter-specific extra fields, opaque to the gateway core.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// What the gateway asks an adapter to send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct OutboundMessage {
    /// Message body.
    pub text: String,
    /// Rendering hint.
    pub format: MessageFormat,
    /// Interactive elements, in display order.
    #[serde(default)]
    pub buttons: Vec<Button>,
}

impl OutboundMessage {
    /// Construct a plain-text message with no buttons.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
            buttons: Vec::new(),
        }
    }

    /// Construct a markdown message with no buttons.
    #[must_use]
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Markdown,
            buttons: Vec::new(),
        }
    }

    /// Attach buttons, replacing any existing ones.
    #[must_use]
    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// Where a reply should land: the chat, thread, and message it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReplyContext {
    /// Platform the conversation is on.
    pub platform: Platform,
    /// Chat to reply into.
    pub chat_id: String,
    /// Message being replied to, if any.
    pub message_id: Option<String>,
    /// Thread to reply into, if the platform supports threads.
    pub thread_id: Option<String>,
}

impl ReplyContext {
    /// Build a reply context from the inbound message that triggered it.
    #[must_use]
    pub fn from_inbound(msg: &InboundMessage) -> Self {
        Self {
            platform: msg.platform,
            chat_id: msg.chat_id.clone(),
            message_id: Some(msg.message_id.clone()),
            thread_id: msg.thread_id.clone(),
        }
    }
}
