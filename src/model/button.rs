//! Interactive buttons and the platform-agnostic callback-payload encoding.

use serde::{Deserialize, Serialize};

use crate::model::platform::Platform;

/// Visual emphasis of a [`Button`], mapped to each platform's own styling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    /// Default emphasis.
    Primary,
    /// Neutral emphasis.
    Secondary,
    /// Destructive/confirm emphasis.
    Danger,
}

/// A declarative interactive element attached to an [`crate::model::OutboundMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Button {
    /// Stable identifier, e.g. `approve_A1`.
    pub button_id: String,
    /// Visible label.
    pub label: String,
    /// Visual style.
    pub style: ButtonStyle,
    /// Opaque payload round-tripped alongside `button_id`.
    pub data: String,
}

impl Button {
    /// Construct a new button.
    #[must_use]
    pub fn new(
        button_id: impl Into<String>,
        label: impl Into<String>,
        style: ButtonStyle,
        data: impl Into<String>,
    ) -> Self {
        Self {
            button_id: button_id.into(),
            label: label.into(),
            style,
            data: data.into(),
        }
    }

    /// Pack `(button_id, data)` into the platform callback-payload form
    /// `"{button_id}:{data}"` (§6 Chat-platform wire specifics).
    #[must_use]
    pub fn encode_callback(&self) -> String {
        format!("{}:{}", self.button_id, self.data)
    }

    /// Split a callback payload on the **first** colon, recovering
    /// `(button_id, data)`. Returns `None` if no colon is present.
    #[must_use]
    pub fn decode_callback(payload: &str) -> Option<(&str, &str)> {
        payload.split_once(':')
    }
}

/// Inbound event reporting a user clicked a [`Button`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ButtonClick {
    /// Platform the click arrived on.
    pub platform: Platform,
    /// Chat the click happened in.
    pub chat_id: String,
    /// User who clicked.
    pub user_id: String,
    /// The chat-message-ID that carried the button.
    pub message_id: String,
    /// Decoded button identifier.
    pub button_id: String,
    /// Decoded opaque data.
    pub data: String,
}
