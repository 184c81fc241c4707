//! Global configuration parsing and validation.
//!
//! Loading configuration from disk is an external collaborator's job (see
//! `spec.md` §1 Out of scope); this module only owns the shape every other
//! component reads from and the validation that rejects a structurally
//! impossible config before the gateway starts anything.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_ipc_socket_path() -> PathBuf {
    std::env::temp_dir().join("zen-gateway.sock")
}

fn default_mention_keywords() -> Vec<String> {
    vec!["@zen".to_owned(), "/zen".to_owned(), "zen".to_owned()]
}

fn default_true() -> bool {
    true
}

const fn default_stale_threshold_secs() -> u64 {
    30
}

const fn default_cleanup_interval_secs() -> u64 {
    300
}

const fn default_session_max_age_secs() -> u64 {
    24 * 60 * 60
}

const fn default_http_port() -> u16 {
    8088
}

/// Whether mention-gating is relaxed for direct messages or channel messages.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MentionMode {
    /// Always respond regardless of `require_mention`.
    Always,
    /// Fall back to the global `require_mention` policy.
    #[default]
    Default,
}

/// Per-adapter inbound filtering: empty lists allow everyone/everywhere.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct AccessControl {
    /// Allowed user IDs; empty means allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Allowed chat IDs; empty means allow all.
    #[serde(default)]
    pub allowed_chats: Vec<String>,
    /// Chat where worker-originated notifications/approvals are posted.
    #[serde(default)]
    pub default_chat_id: Option<String>,
}

impl AccessControl {
    /// Whether `user_id` is allowed to interact with this adapter.
    #[must_use]
    pub fn allows_user(&self, user_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user_id)
    }

    /// Whether `chat_id` is allowed to interact with this adapter.
    #[must_use]
    pub fn allows_chat(&self, chat_id: &str) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.iter().any(|c| c == chat_id)
    }
}

/// Telegram long-polling adapter credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelegramConfig {
    /// Bot API token, or `keyring:<account>` to resolve via the OS keyring.
    pub bot_token: String,
    /// Common access-control fields.
    #[serde(flatten)]
    pub access: AccessControl,
}

/// Discord webhook/interaction adapter credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DiscordConfig {
    /// Bot token used for the HTTPS API and to verify gateway identity.
    pub bot_token: String,
    /// Public key used to verify interaction request signatures.
    pub public_key: String,
    /// Common access-control fields.
    #[serde(flatten)]
    pub access: AccessControl,
}

/// Slack Events/Interactions adapter credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Bot user OAuth token used for `chat.postMessage` etc.
    pub bot_token: String,
    /// Signing secret used to verify inbound event/interaction requests.
    pub signing_secret: String,
    /// Common access-control fields.
    #[serde(flatten)]
    pub access: AccessControl,
}

/// Lark/Feishu adapter credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LarkConfig {
    /// App ID used to mint `tenant_access_token`.
    pub app_id: String,
    /// App secret used to mint `tenant_access_token` and verify signatures.
    pub app_secret: String,
    /// Common access-control fields.
    #[serde(flatten)]
    pub access: AccessControl,
}

/// Facebook Messenger adapter credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MessengerConfig {
    /// Page access token used for the Send API.
    pub page_access_token: String,
    /// App secret used to validate the webhook signature.
    pub app_secret: String,
    /// Shared secret returned during webhook subscription verification.
    pub verify_token: String,
    /// Common access-control fields.
    #[serde(flatten)]
    pub access: AccessControl,
}

/// Daily window during which non-error notifications are suppressed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct QuietHoursConfig {
    /// Whether quiet hours are enforced at all.
    #[serde(default)]
    pub enabled: bool,
    /// Window start, `"HH:MM"`.
    #[serde(default)]
    pub start: String,
    /// Window end, `"HH:MM"`.
    #[serde(default)]
    pub end: String,
    /// IANA timezone name; falls back to local time if unresolvable.
    #[serde(default)]
    pub timezone: String,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Unix-domain-socket path the IPC hub listens on.
    #[serde(default = "default_ipc_socket_path")]
    pub ipc_socket_path: PathBuf,
    /// HTTP port the webhook-style adapters (Discord/Slack/Lark/Messenger) bind.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Mention keywords recognized by the intent parser (§4.5).
    #[serde(default = "default_mention_keywords")]
    pub mention_keywords: Vec<String>,
    /// Global mention-gating default.
    #[serde(default = "default_true")]
    pub require_mention: bool,
    /// Mention-gating override for direct messages.
    #[serde(default)]
    pub direct_message_mode: MentionMode,
    /// Mention-gating override for channel messages.
    #[serde(default)]
    pub channel_mode: MentionMode,
    /// Persistent `alias -> workspace_path` map (§3 Alias map).
    #[serde(default)]
    pub aliases: HashMap<String, PathBuf>,
    /// Quiet-hours window for worker notifications.
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    /// Process considered stale after this many seconds without a heartbeat.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    /// Interval between cleanup-loop ticks.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Sessions idle longer than this are garbage-collected.
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
    /// Telegram adapter config; absent disables the adapter.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    /// Discord adapter config; absent disables the adapter.
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    /// Slack adapter config; absent disables the adapter.
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    /// Lark/Feishu adapter config; absent disables the adapter.
    #[serde(default)]
    pub lark: Option<LarkConfig>,
    /// Facebook Messenger adapter config; absent disables the adapter.
    #[serde(default)]
    pub messenger: Option<MessengerConfig>,
}

impl GlobalConfig {
    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve `keyring:`-prefixed credential fields via the OS keyring,
    /// leaving inline values untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a `keyring:` reference cannot be resolved.
    pub fn load_credentials(&mut self) -> Result<()> {
        if let Some(ref mut tg) = self.telegram {
            tg.bot_token = resolve_credential(&tg.bot_token)?;
        }
        if let Some(ref mut dc) = self.discord {
            dc.bot_token = resolve_credential(&dc.bot_token)?;
        }
        if let Some(ref mut sl) = self.slack {
            sl.bot_token = resolve_credential(&sl.bot_token)?;
        }
        if let Some(ref mut lk) = self.lark {
            lk.app_secret = resolve_credential(&lk.app_secret)?;
        }
        if let Some(ref mut mg) = self.messenger {
            mg.page_access_token = resolve_credential(&mg.page_access_token)?;
        }
        Ok(())
    }

    /// Whether any adapter has enough credentials configured to start.
    #[must_use]
    pub fn has_any_adapter(&self) -> bool {
        self.telegram.is_some()
            || self.discord.is_some()
            || self.slack.is_some()
            || self.lark.is_some()
            || self.messenger.is_some()
    }

    fn validate(&mut self) -> Result<()> {
        if self.mention_keywords.is_empty() {
            self.mention_keywords = default_mention_keywords();
        }
        if self.stale_threshold_secs == 0 {
            return Err(AppError::Config(
                "stale_threshold_secs must be greater than zero".into(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(AppError::Config(
                "cleanup_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_credential(raw: &str) -> Result<String> {
    let Some(account) = raw.strip_prefix("keyring:") else {
        return Ok(raw.to_owned());
    };
    let entry = keyring::Entry::new("bot-gateway", account)
        .map_err(|err| AppError::Config(format!("keyring entry '{account}' invalid: {err}")))?;
    entry
        .get_password()
        .map_err(|err| AppError::Config(format!("keyring lookup for '{account}' failed: {err}")))
}
