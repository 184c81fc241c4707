//! Discord adapter: gateway client for inbound events, HTTPS for sends.

use std::sync::Arc;

use chrono::Utc;
use serenity::all::{
    ButtonStyle as SerenityButtonStyle, ChannelId, Context, CreateActionRow, CreateButton,
    CreateMessage, EditMessage, EventHandler, GatewayIntents, Interaction, Message, MessageId,
    Ready,
};
use serenity::Client;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{passes_inbound_filter, strip_mention, Adapter, AdapterFuture, InboundSink};
use crate::config::DiscordConfig;
use crate::model::{Button, ButtonClick, ButtonStyle, InboundMessage, OutboundMessage, Platform};
use crate::{AppError, Result};

fn to_serenity_style(style: ButtonStyle) -> SerenityButtonStyle {
    match style {
        ButtonStyle::Primary => SerenityButtonStyle::Primary,
        ButtonStyle::Secondary => SerenityButtonStyle::Secondary,
        ButtonStyle::Danger => SerenityButtonStyle::Danger,
    }
}

fn build_components(buttons: &[Button]) -> Vec<CreateActionRow> {
    buttons
        .chunks(5)
        .map(|chunk| {
            let row: Vec<CreateButton> = chunk
                .iter()
                .map(|button| {
                    CreateButton::new(button.encode_callback())
                        .label(button.label.clone())
                        .style(to_serenity_style(button.style))
                })
                .collect();
            CreateActionRow::Buttons(row)
        })
        .collect()
}

struct DiscordHandler {
    sink: Arc<dyn InboundSink>,
    config: DiscordConfig,
    bot_user_id: Arc<OnceCell<u64>>,
    http: Arc<OnceCell<Arc<serenity::http::Http>>>,
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        let _ = self.bot_user_id.set(ready.user.id.get());
        let _ = self.http.set(ctx.http.clone());
        info!(bot_id = ready.user.id.get(), "discord adapter started");
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let bot_id = self.bot_user_id.get().copied().unwrap_or_default().to_string();
        let user_id = message.author.id.get().to_string();
        let chat_id = message.channel_id.get().to_string();
        if !passes_inbound_filter(&self.config.access, &bot_id, &user_id, &chat_id) {
            return;
        }
        let username = message
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| message.author.name.clone());
        let bot_mention_tag = self
            .bot_user_id
            .get()
            .map(|id| format!("<@{id}>"))
            .unwrap_or_default();
        let mentioned = message.content.contains(&bot_mention_tag);
        let (_, stripped_by_name) = strip_mention(&message.content, &username);
        let content = if mentioned {
            message.content.replacen(&bot_mention_tag, "", 1).trim_start().to_owned()
        } else {
            stripped_by_name.to_owned()
        };

        let inbound = InboundMessage {
            message_id: message.id.get().to_string(),
            platform: Platform::Discord,
            chat_id,
            thread_id: None,
            user_id,
            user_name: username,
            content,
            reply_to: message
                .referenced_message
                .as_ref()
                .map(|reply| reply.id.get().to_string()),
            timestamp: Utc::now(),
            is_mention: mentioned,
            is_direct_message: message.guild_id.is_none(),
            metadata: std::collections::HashMap::new(),
        };
        self.sink.on_message(inbound).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };
        if let Err(err) = component.defer(&ctx.http).await {
            warn!(%err, "failed to ack discord component interaction");
        }
        let data = component.data.custom_id.clone();
        let Some((button_id, payload)) = Button::decode_callback(&data) else {
            warn!(custom_id = %data, "discord custom_id with no colon separator, ignoring");
            return;
        };
        let click = ButtonClick {
            platform: Platform::Discord,
            chat_id: component.channel_id.get().to_string(),
            user_id: component.user.id.get().to_string(),
            message_id: component.message.id.get().to_string(),
            button_id: button_id.to_owned(),
            data: payload.to_owned(),
        };
        self.sink.on_button(click).await;
    }
}

/// Discord gateway-client adapter.
pub struct DiscordAdapter {
    config: DiscordConfig,
    bot_user_id: Arc<OnceCell<u64>>,
    http: Arc<OnceCell<Arc<serenity::http::Http>>>,
}

impl DiscordAdapter {
    /// Construct an adapter from configuration; connects on [`Adapter::start`].
    #[must_use]
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            bot_user_id: Arc::new(OnceCell::new()),
            http: Arc::new(OnceCell::new()),
        }
    }

    fn http(&self) -> Result<Arc<serenity::http::Http>> {
        self.http
            .get()
            .cloned()
            .ok_or_else(|| AppError::Adapter("discord adapter not yet connected".into()))
    }
}

impl Adapter for DiscordAdapter {
    fn platform_tag(&self) -> Platform {
        Platform::Discord
    }

    fn bot_user_id(&self) -> String {
        self.bot_user_id.get().map(ToString::to_string).unwrap_or_default()
    }

    fn start(&self, sink: Arc<dyn InboundSink>, cancel: CancellationToken) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async move {
            let handler = DiscordHandler {
                sink,
                config: self.config.clone(),
                bot_user_id: self.bot_user_id.clone(),
                http: self.http.clone(),
            };
            let intents = GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::DIRECT_MESSAGES
                | GatewayIntents::MESSAGE_CONTENT;
            let mut client = Client::builder(&self.config.bot_token, intents)
                .event_handler(handler)
                .await
                .map_err(|err| AppError::Adapter(format!("discord client build failed: {err}")))?;
            let shard_manager = client.shard_manager.clone();

            tokio::select! {
                result = client.start() => {
                    result.map_err(|err| AppError::Adapter(format!("discord client stopped: {err}")))
                }
                () = cancel.cancelled() => {
                    shard_manager.shutdown_all().await;
                    Ok(())
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
            let http = self.http()?;
            let id: u64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord channel id '{chat_id}'")))?;
            let builder = CreateMessage::new()
                .content(message.text.clone())
                .components(build_components(&message.buttons));
            let sent = ChannelId::new(id)
                .send_message(&http, builder)
                .await
                .map_err(|err| AppError::Adapter(format!("discord send failed: {err}")))?;
            Ok(sent.id.get().to_string())
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
            let http = self.http()?;
            let id: u64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord channel id '{chat_id}'")))?;
            let reply_id: u64 = reply_to
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord message id '{reply_to}'")))?;
            let builder = CreateMessage::new()
                .content(message.text.clone())
                .components(build_components(&message.buttons))
                .reference_message((ChannelId::new(id), MessageId::new(reply_id)));
            let sent = ChannelId::new(id)
                .send_message(&http, builder)
                .await
                .map_err(|err| AppError::Adapter(format!("discord reply failed: {err}")))?;
            Ok(sent.id.get().to_string())
        })
    }

    fn edit(&self, chat_id: &str, message_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let http = self.http()?;
            let id: u64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord channel id '{chat_id}'")))?;
            let msg_id: u64 = message_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord message id '{message_id}'")))?;
            let builder = EditMessage::new()
                .content(message.text.clone())
                .components(build_components(&message.buttons));
            ChannelId::new(id)
                .edit_message(&http, MessageId::new(msg_id), builder)
                .await
                .map_err(|err| AppError::Adapter(format!("discord edit failed: {err}")))?;
            Ok(())
        })
    }

    fn delete(&self, chat_id: &str, message_id: &str) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let http = self.http()?;
            let id: u64 = chat_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord channel id '{chat_id}'")))?;
            let msg_id: u64 = message_id
                .parse()
                .map_err(|_| AppError::Adapter(format!("invalid discord message id '{message_id}'")))?;
            ChannelId::new(id)
                .delete_message(&http, MessageId::new(msg_id))
                .await
                .map_err(|err| AppError::Adapter(format!("discord delete failed: {err}")))?;
            Ok(())
        })
    }
}
