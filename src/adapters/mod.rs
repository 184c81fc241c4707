//! Platform Adapters (C1): one implementation per chat platform, each
//! translating platform-native events into the canonical
//! [`crate::model::InboundMessage`] / [`crate::model::OutboundMessage`] /
//! [`crate::model::ButtonClick`] types.

pub mod discord;
pub mod lark;
pub mod messenger;
pub mod slack;
pub mod telegram;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::model::{ButtonClick, InboundMessage, OutboundMessage, Platform};
use crate::Result;

/// Boxed future alias used to keep [`Adapter`] and [`InboundSink`]
/// object-safe without requiring `async_trait`.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Destination the Gateway Core wires into every adapter at `start` time, in
/// place of the mutable `set_message_handler`/`set_button_handler` setters
/// named in §4.1 — the Gateway *is* the handler, supplied by dependency
/// injection rather than a settable callback slot.
pub trait InboundSink: Send + Sync {
    /// Deliver one inbound chat message for gateway dispatch.
    fn on_message(&self, message: InboundMessage) -> AdapterFuture<'_, ()>;
    /// Deliver one button-click event for gateway dispatch.
    fn on_button(&self, click: ButtonClick) -> AdapterFuture<'_, ()>;
}

/// Capability set every platform driver implements (§4.1).
pub trait Adapter: Send + Sync {
    /// Which platform this adapter drives.
    fn platform_tag(&self) -> Platform;

    /// The bot's own platform-scoped user ID, used to drop self-originated
    /// messages and to detect `@botname` mentions.
    fn bot_user_id(&self) -> String;

    /// Begin the adapter's I/O loop (long-poll, webhook router mount, token
    /// refresh timer, …), delivering events to `sink` until `cancel` fires.
    fn start(
        &self,
        sink: Arc<dyn InboundSink>,
        cancel: CancellationToken,
    ) -> AdapterFuture<'_, Result<()>>;

    /// Stop the adapter's I/O loop, releasing any held resources.
    fn stop(&self) -> AdapterFuture<'_, ()>;

    /// Send a new message into `chat_id`, returning the platform message ID.
    fn send(&self, chat_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<String>>;

    /// Send a message that replies to `reply_to` within `chat_id`.
    fn reply(
        &self,
        chat_id: &str,
        reply_to: &str,
        message: OutboundMessage,
    ) -> AdapterFuture<'_, Result<String>>;

    /// Replace the content (and buttons) of an existing message. An empty
    /// button list must clear any existing interactive row.
    fn edit(&self, chat_id: &str, message_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<()>>;

    /// Delete a previously sent message.
    fn delete(&self, chat_id: &str, message_id: &str) -> AdapterFuture<'_, Result<()>>;
}

/// Whether `user_id`/`chat_id` pass the adapter's configured allow-lists and
/// are not the bot talking to itself (§4.1 Inbound filtering).
#[must_use]
pub fn passes_inbound_filter(
    access: &crate::config::AccessControl,
    bot_user_id: &str,
    user_id: &str,
    chat_id: &str,
) -> bool {
    user_id != bot_user_id && access.allows_user(user_id) && access.allows_chat(chat_id)
}

/// Strip a leading `@botname` mention token from `content` if present,
/// reporting whether a mention was found (§4.1 Mention detection).
#[must_use]
pub fn strip_mention<'a>(content: &'a str, bot_username: &str) -> (bool, &'a str) {
    let token = format!("@{bot_username}");
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix(&token) {
        (true, rest.trim_start())
    } else {
        (false, content)
    }
}
