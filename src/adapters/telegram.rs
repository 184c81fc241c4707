//! Telegram adapter: long-polling `getUpdates`, inline-keyboard buttons.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teloxide::payloads::{EditMessageReplyMarkupSetters, EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId, ParseMode,
    UpdateKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{passes_inbound_filter, strip_mention, Adapter, AdapterFuture, InboundSink};
use crate::config::TelegramConfig;
use crate::model::{Button, ButtonClick, InboundMessage, MessageFormat, OutboundMessage, Platform};
use crate::{AppError, Result};

const LONG_POLL_TIMEOUT_SECS: u32 = 30;
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram Bot API adapter.
pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramConfig,
    bot_user_id: tokio::sync::OnceCell<i64>,
    bot_username: tokio::sync::OnceCell<String>,
    last_update_id: AtomicI32,
}

impl TelegramAdapter {
    /// Construct an adapter from configuration; does not contact Telegram
    /// until [`Adapter::start`] resolves the bot identity via `getMe`.
    #[must_use]
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            config,
            bot_user_id: tokio::sync::OnceCell::new(),
            bot_username: tokio::sync::OnceCell::new(),
            last_update_id: AtomicI32::new(0),
        }
    }

    async fn handle_message(&self, sink: &Arc<dyn InboundSink>, message: Message) {
        let Some(text) = message.text() else { return };
        let username = self.bot_username.get().map(String::as_str).unwrap_or_default();
        let (is_mention, stripped) = strip_mention(text, username);
        let user_id = message
            .from
            .as_ref()
            .map(|u| u.id.0.to_string())
            .unwrap_or_default();
        let user_name = message
            .from
            .as_ref()
            .map(|u| u.full_name())
            .unwrap_or_default();
        let bot_id = self.bot_user_id.get().copied().unwrap_or_default().to_string();
        let chat_id = message.chat.id.0.to_string();

        if !passes_inbound_filter(&self.config.access, &bot_id, &user_id, &chat_id) {
            return;
        }

        let inbound = InboundMessage {
            message_id: message.id.0.to_string(),
            platform: Platform::Telegram,
            chat_id,
            thread_id: message.thread_id.map(|id| id.0.to_string()),
            user_id,
            user_name,
            content: stripped.to_owned(),
            reply_to: message
                .reply_to_message()
                .map(|reply| reply.id.0.to_string()),
            timestamp: Utc::now(),
            is_mention,
            is_direct_message: message.chat.is_private(),
            metadata: std::collections::HashMap::new(),
        };
        sink.on_message(inbound).await;
    }

    async fn handle_callback(&self, sink: &Arc<dyn InboundSink>, query: CallbackQuery) {
        let Some(data) = query.data else { return };
        let Some((button_id, payload)) = Button::decode_callback(&data) else {
            warn!(data = %data, "telegram callback with no colon separator, ignoring");
            return;
        };
        let Some(message) = query.message else { return };
        let click = ButtonClick {
            platform: Platform::Telegram,
            chat_id: message.chat().id.0.to_string(),
            user_id: query.from.id.0.to_string(),
            message_id: message.id().0.to_string(),
            button_id: button_id.to_owned(),
            data: payload.to_owned(),
        };
        sink.on_button(click).await;
    }

    fn build_keyboard(buttons: &[Button]) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = buttons
            .chunks(2)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.encode_callback()))
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn parse_mode(format: MessageFormat) -> Option<ParseMode> {
        match format {
            // TODO: escape MarkdownV2 reserved characters in worker-supplied text.
            MessageFormat::Markdown => Some(ParseMode::Markdown),
            MessageFormat::Plain => None,
        }
    }
}

impl Adapter for TelegramAdapter {
    fn platform_tag(&self) -> Platform {
        Platform::Telegram
    }

    fn bot_user_id(&self) -> String {
        self.bot_user_id
            .get()
            .map(|id| id.to_string())
            .unwrap_or_default()
    }

    fn start(&self, sink: Arc<dyn InboundSink>, cancel: CancellationToken) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async move {
            let me = self
                .bot
                .get_me()
                .await
                .map_err(|err| AppError::Adapter(format!("telegram getMe failed: {err}")))?;
            let user = &me.user;
            let _ = self.bot_user_id.set(user.id.0 as i64);
            let _ = self
                .bot_username
                .set(user.username.clone().unwrap_or_default());
            info!(bot_id = user.id.0, "telegram adapter started");

            loop {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let offset = self.last_update_id.load(Ordering::Relaxed) + 1;
                let updates = tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    result = self
                        .bot
                        .get_updates()
                        .offset(offset)
                        .timeout(LONG_POLL_TIMEOUT_SECS)
                        .send() => result,
                };

                let updates = match updates {
                    Ok(updates) => updates,
                    Err(err) => {
                        warn!(%err, "telegram getUpdates failed, backing off");
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                };

                for update in updates {
                    self.last_update_id.store(update.id.0 as i32, Ordering::Relaxed);
                    match update.kind {
                        UpdateKind::Message(message) => self.handle_message(&sink, message).await,
                        UpdateKind::CallbackQuery(query) => self.handle_callback(&sink, query).await,
                        _ => {}
                    }
                }
            }
        })
    }

    fn stop(&self) -> AdapterFuture<'_, ()> {
        Box::pin(async {})
    }

    fn send(&self, chat_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<String>> {
        let chat_id = chat_id.to_owned();
        Box::pin(async move {
            let id: i64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram chat_id '{chat_id}'")))?;
            let mut request = self.bot.send_message(ChatId(id), message.text.clone());
            if let Some(mode) = Self::parse_mode(message.format) {
                request = request.parse_mode(mode);
            }
            if !message.buttons.is_empty() {
                request = request.reply_markup(Self::build_keyboard(&message.buttons));
            }
            let sent = request
                .await
                .map_err(|err| AppError::Adapter(format!("telegram send failed: {err}")))?;
            Ok(sent.id.0.to_string())
        })
    }

    fn reply(
        &self,
        chat_id: &str,
        reply_to: &str,
        message: OutboundMessage,
    ) -> AdapterFuture<'_, Result<String>> {
        let chat_id = chat_id.to_owned();
        let reply_to = reply_to.to_owned();
        Box::pin(async move {
            let id: i64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram chat_id '{chat_id}'")))?;
            let reply_id: i32 = reply_to
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram message_id '{reply_to}'")))?;
            let mut request = self
                .bot
                .send_message(ChatId(id), message.text.clone())
                .reply_to_message_id(MessageId(reply_id));
            if let Some(mode) = Self::parse_mode(message.format) {
                request = request.parse_mode(mode);
            }
            if !message.buttons.is_empty() {
                request = request.reply_markup(Self::build_keyboard(&message.buttons));
            }
            let sent = request
                .await
                .map_err(|err| AppError::Adapter(format!("telegram reply failed: {err}")))?;
            Ok(sent.id.0.to_string())
        })
    }

    fn edit(&self, chat_id: &str, message_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let id: i64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram chat_id '{chat_id}'")))?;
            let msg_id: i32 = message_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram message_id '{message_id}'")))?;
            let mut request = self
                .bot
                .edit_message_text(ChatId(id), MessageId(msg_id), message.text.clone());
            if let Some(mode) = Self::parse_mode(message.format) {
                request = request.parse_mode(mode);
            }
            request
                .await
                .map_err(|err| AppError::Adapter(format!("telegram edit failed: {err}")))?;

            // An empty button list must clear any existing interactive row.
            let keyboard = Self::build_keyboard(&message.buttons);
            self.bot
                .edit_message_reply_markup(ChatId(id), MessageId(msg_id))
                .reply_markup(keyboard)
                .await
                .map_err(|err| AppError::Adapter(format!("telegram reply_markup edit failed: {err}")))?;
            Ok(())
        })
    }

    fn delete(&self, chat_id: &str, message_id: &str) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let id: i64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram chat_id '{chat_id}'")))?;
            let msg_id: i32 = message_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid telegram message_id '{message_id}'")))?;
            self.bot
                .delete_message(ChatId(id), MessageId(msg_id))
                .await
                .map_err(|err| AppError::Adapter(format!("telegram delete failed: {err}")))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_wraps_buttons_in_rows_of_two() {
        let buttons = vec![
            Button::new("a", "A", crate::model::ButtonStyle::Primary, "1"),
            Button::new("b", "B", crate::model::ButtonStyle::Secondary, "2"),
            Button::new("c", "C", crate::model::ButtonStyle::Danger, "3"),
        ];
        let keyboard = TelegramAdapter::build_keyboard(&buttons);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);
    }
}
