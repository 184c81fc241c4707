//! The chat platforms the gateway bridges.

use serde::{Deserialize, Serialize};

/// Immutable tag identifying which chat platform a message or session belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Telegram Bot API.
    Telegram,
    /// Discord.
    Discord,
    /// Slack.
    Slack,
    /// Lark / Feishu.
    Lark,
    /// Facebook Messenger.
    FbMessenger,
}

impl Platform {
    /// Short lowercase tag used in logs and dispatch tables.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Lark => "lark",
            Self::FbMessenger => "fb_messenger",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
