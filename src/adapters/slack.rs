//! Slack adapter: Events API + interactivity over an HTTPS webhook router,
//! `chat.postMessage`/`chat.update`/`chat.delete` for outbound sends.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use slack_morphism::prelude::{
    SlackApiChatDeleteRequest, SlackApiChatPostMessageRequest, SlackApiChatUpdateRequest,
    SlackApiToken, SlackApiTokenType, SlackApiTokenValue, SlackActionBlockElement,
    SlackActionsBlock, SlackBlock, SlackBlockButtonElement, SlackBlockButtonStyle,
    SlackBlockPlainTextOnly, SlackBlockText, SlackChannelId, SlackClient,
    SlackClientHyperHttpsConnector, SlackClientSession, SlackMessageContent, SlackSectionBlock,
    SlackTs,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{passes_inbound_filter, Adapter, AdapterFuture, InboundSink};
use crate::config::SlackConfig;
use crate::model::{Button, ButtonClick, ButtonStyle, InboundMessage, OutboundMessage, Platform};
use crate::{AppError, Result};

const SIGNING_VERSION: &str = "v0";
/// Requests timestamped more than this many seconds away from now are
/// rejected as stale/replayed, per Slack's signing guidance.
const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;
    let mut key_block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        let hashed = Sha256::digest(key);
        key_block[..32].copy_from_slice(&hashed);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }
    let mut ipad = [0x36u8; BLOCK_SIZE];
    let mut opad = [0x5cu8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        ipad[i] ^= key_block[i];
        opad[i] ^= key_block[i];
    }
    let inner = Sha256::new()
        .chain_update(ipad)
        .chain_update(message)
        .finalize();
    Sha256::new()
        .chain_update(opad)
        .chain_update(inner)
        .finalize()
        .into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn verify_signature(signing_secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(timestamp) = headers
        .get("X-Slack-Request-Timestamp")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(signature) = headers
        .get("X-Slack-Signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Ok(ts): std::result::Result<i64, _> = timestamp.parse() else {
        return false;
    };
    if (Utc::now().timestamp() - ts).abs() > MAX_CLOCK_SKEW_SECS {
        return false;
    }
    let base = format!("{SIGNING_VERSION}:{timestamp}:{}", String::from_utf8_lossy(body));
    let digest = hmac_sha256(signing_secret.as_bytes(), base.as_bytes());
    let expected = format!("{SIGNING_VERSION}={}", hex_encode(&digest));
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Map a [`ButtonStyle`] onto Slack's Block Kit style, omitting it for
/// `default`-emphasis buttons as Slack's API expects (§6 wire specifics).
fn slack_button_style(style: ButtonStyle) -> Option<SlackBlockButtonStyle> {
    match style {
        ButtonStyle::Primary => Some(SlackBlockButtonStyle::Primary),
        ButtonStyle::Danger => Some(SlackBlockButtonStyle::Danger),
        ButtonStyle::Secondary => None,
    }
}

fn action_buttons(block_id: &str, buttons: &[Button]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|button| {
            let mut element = SlackBlockButtonElement::new(
                button.encode_callback().into(),
                SlackBlockPlainTextOnly::from(button.label.clone()),
            )
            .with_value(button.data.clone());
            if let Some(style) = slack_button_style(button.style) {
                element = element.with_style(style);
            }
            SlackActionBlockElement::Button(element)
        })
        .collect();
    SlackBlock::Actions(SlackActionsBlock::new(elements).with_block_id(block_id.into()))
}

fn message_blocks(message: &OutboundMessage) -> Vec<SlackBlock> {
    let mut blocks = vec![text_section(&message.text)];
    if !message.buttons.is_empty() {
        blocks.push(action_buttons("actions", &message.buttons));
    }
    blocks
}

struct WebhookState {
    config: SlackConfig,
    sink: Arc<dyn InboundSink>,
    bot_user_id: Arc<OnceCell<String>>,
}

#[derive(Deserialize)]
struct InteractionForm {
    payload: String,
}

async fn events_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if !verify_signature(&state.config.signing_secret, &headers, &body) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, String::new());
    };

    if value.get("type").and_then(Value::as_str) == Some("url_verification") {
        let challenge = value
            .get("challenge")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return (StatusCode::OK, challenge);
    }

    if value.get("type").and_then(Value::as_str) == Some("event_callback") {
        if let Some(event) = value.get("event") {
            handle_event(&state, event).await;
        }
    }
    (StatusCode::OK, String::new())
}

async fn handle_event(state: &Arc<WebhookState>, event: &Value) {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    if event_type != "message" && event_type != "app_mention" {
        return;
    }
    if event.get("bot_id").is_some() {
        return;
    }
    let channel = event.get("channel").and_then(Value::as_str).unwrap_or_default();
    let user = event.get("user").and_then(Value::as_str).unwrap_or_default();
    let text = event.get("text").and_then(Value::as_str).unwrap_or_default();
    let ts = event.get("ts").and_then(Value::as_str).unwrap_or_default();
    let thread_ts = event.get("thread_ts").and_then(Value::as_str);
    let channel_type = event.get("channel_type").and_then(Value::as_str);

    let bot_id = state.bot_user_id.get().map(String::as_str).unwrap_or_default();
    if !passes_inbound_filter(&state.config.access, bot_id, user, channel) {
        return;
    }

    let inbound = InboundMessage {
        message_id: ts.to_owned(),
        platform: Platform::Slack,
        chat_id: channel.to_owned(),
        thread_id: thread_ts.map(str::to_owned),
        user_id: user.to_owned(),
        user_name: String::new(),
        content: text.to_owned(),
        reply_to: None,
        timestamp: Utc::now(),
        is_mention: event_type == "app_mention",
        is_direct_message: channel_type == Some("im"),
        metadata: std::collections::HashMap::new(),
    };
    state.sink.on_message(inbound).await;
}

async fn interactions_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Form(form): Form<InteractionForm>,
) -> impl IntoResponse {
    let raw = format!("payload={}", form.payload);
    if !verify_signature(&state.config.signing_secret, &headers, raw.as_bytes()) {
        return StatusCode::UNAUTHORIZED;
    }
    let Ok(payload) = serde_json::from_str::<Value>(&form.payload) else {
        return StatusCode::BAD_REQUEST;
    };
    let Some(actions) = payload.get("actions").and_then(Value::as_array) else {
        return StatusCode::OK;
    };
    let user_id = payload
        .pointer("/user/id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let channel_id = payload
        .pointer("/channel/id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let message_id = payload
        .pointer("/message/ts")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    for action in actions {
        let action_id = action.get("action_id").and_then(Value::as_str).unwrap_or_default();
        let Some((button_id, data)) = Button::decode_callback(action_id) else {
            warn!(action_id, "slack action_id with no colon separator, ignoring");
            continue;
        };
        let click = ButtonClick {
            platform: Platform::Slack,
            chat_id: channel_id.clone(),
            user_id: user_id.clone(),
            message_id: message_id.clone(),
            button_id: button_id.to_owned(),
            data: data.to_owned(),
        };
        state.sink.on_button(click).await;
    }
    StatusCode::OK
}

/// Slack Events API + interactivity webhook adapter.
pub struct SlackAdapter {
    config: SlackConfig,
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    bot_user_id: Arc<OnceCell<String>>,
}

impl SlackAdapter {
    /// Construct an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Adapter` if the HTTPS connector cannot be created.
    pub fn new(config: SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Adapter(format!("slack connector init failed: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        Ok(Self {
            config,
            client,
            bot_token,
            bot_user_id: Arc::new(OnceCell::new()),
        })
    }

    fn session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    async fn resolve_identity(&self) -> Result<()> {
        let response = reqwest::Client::new()
            .post("https://slack.com/api/auth.test")
            .bearer_auth(&self.config.bot_token)
            .send()
            .await
            .map_err(|err| AppError::Adapter(format!("slack auth.test failed: {err}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|err| AppError::Adapter(format!("slack auth.test decode failed: {err}")))?;
        let user_id = body
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let _ = self.bot_user_id.set(user_id);
        Ok(())
    }

    /// Build the `axum` router mounting this adapter's webhook endpoints.
    /// The Gateway Core merges this into the shared HTTP server listening
    /// on `http_port` rather than each webhook adapter binding its own.
    #[must_use]
    pub fn router(self: &Arc<Self>, sink: Arc<dyn InboundSink>) -> Router {
        let state = Arc::new(WebhookState {
            config: self.config.clone(),
            sink,
            bot_user_id: self.bot_user_id.clone(),
        });
        Router::new()
            .route("/slack/events", post(events_handler))
            .route("/slack/interactions", post(interactions_handler))
            .with_state(state)
    }
}

impl Adapter for SlackAdapter {
    fn platform_tag(&self) -> Platform {
        Platform::Slack
    }

    fn bot_user_id(&self) -> String {
        self.bot_user_id.get().cloned().unwrap_or_default()
    }

    fn start(&self, _sink: Arc<dyn InboundSink>, cancel: CancellationToken) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async move {
            self.resolve_identity().await?;
            info!("slack adapter started, awaiting shutdown (served via shared http router)");
            cancel.cancelled().await;
            Ok(())
        })
    }

    fn stop(&self) -> AdapterFuture<'_, ()> {
        Box::pin(async {})
    }

    fn send(&self, chat_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<String>> {
        let chat_id = chat_id.to_owned();
        Box::pin(async move {
            let request = SlackApiChatPostMessageRequest {
                channel: SlackChannelId(chat_id),
                content: SlackMessageContent {
                    text: Some(message.text.clone()),
                    blocks: Some(message_blocks(&message)),
                    attachments: None,
                    upload: None,
                    files: None,
                    reactions: None,
                    metadata: None,
                },
                as_user: None,
                icon_emoji: None,
                icon_url: None,
                link_names: Some(true),
                parse: None,
                thread_ts: None,
                username: None,
                reply_broadcast: None,
                unfurl_links: None,
                unfurl_media: None,
            };
            let response = self
                .session()
                .chat_post_message(&request)
                .await
                .map_err(|err| AppError::Adapter(format!("slack post failed: {err}")))?;
            Ok(response.ts.0)
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
            let request = SlackApiChatPostMessageRequest {
                channel: SlackChannelId(chat_id),
                content: SlackMessageContent {
                    text: Some(message.text.clone()),
                    blocks: Some(message_blocks(&message)),
                    attachments: None,
                    upload: None,
                    files: None,
                    reactions: None,
                    metadata: None,
                },
                as_user: None,
                icon_emoji: None,
                icon_url: None,
                link_names: Some(true),
                parse: None,
                thread_ts: Some(SlackTs(reply_to)),
                username: None,
                reply_broadcast: None,
                unfurl_links: None,
                unfurl_media: None,
            };
            let response = self
                .session()
                .chat_post_message(&request)
                .await
                .map_err(|err| AppError::Adapter(format!("slack reply failed: {err}")))?;
            Ok(response.ts.0)
        })
    }

    fn edit(&self, chat_id: &str, message_id: &str, message: OutboundMessage) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let request = SlackApiChatUpdateRequest::new(
                SlackChannelId(chat_id),
                SlackMessageContent {
                    text: Some(message.text.clone()),
                    blocks: Some(message_blocks(&message)),
                    attachments: None,
                    upload: None,
                    files: None,
                    reactions: None,
                    metadata: None,
                },
                SlackTs(message_id),
            );
            self.session()
                .chat_update(&request)
                .await
                .map_err(|err| AppError::Adapter(format!("slack update failed: {err}")))?;
            Ok(())
        })
    }

    fn delete(&self, chat_id: &str, message_id: &str) -> AdapterFuture<'_, Result<()>> {
        let chat_id = chat_id.to_owned();
        let message_id = message_id.to_owned();
        Box::pin(async move {
            let request = SlackApiChatDeleteRequest::new(SlackChannelId(chat_id), SlackTs(message_id));
            self.session()
                .chat_delete(&request)
                .await
                .map_err(|err| AppError::Adapter(format!("slack delete failed: {err}")))?;
            Ok(())
        })
    }
}
