//! Facebook Messenger adapter: GET subscription verification + POST webhook,
//! Send API for outbound delivery.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{passes_inbound_filter, Adapter, AdapterFuture, InboundSink};
use crate::config::MessengerConfig;
use crate::model::{Button, ButtonClick, InboundMessage, OutboundMessage, Platform};
use crate::{AppError, Result};

const SEND_URL: &str = "https://graph.facebook.com/v19.0/me/messages";
/// Messenger button templates cap out at three buttons per payload.
const MAX_TEMPLATE_BUTTONS: usize = 3;

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    use sha2::Digest;
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
    let inner = Sha256::new().chain_update(ipad).chain_update(message).finalize();
    Sha256::new().chain_update(opad).chain_update(inner).finalize().into()
}

fn verify_signature(app_secret: &str, body: &[u8], header_sig: &str) -> bool {
    let Some(hex_sig) = header_sig.strip_prefix("sha256=") else {
        return false;
    };
    let digest = hmac_sha256(app_secret.as_bytes(), body);
    let computed = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    computed.eq_ignore_ascii_case(hex_sig)
}

struct WebhookState {
    config: MessengerConfig,
    sink: Arc<dyn InboundSink>,
}

#[derive(Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn verify_handler(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    if query.mode.as_deref() == Some("subscribe")
        && query.verify_token.as_deref() == Some(state.config.verify_token.as_str())
    {
        (StatusCode::OK, query.challenge.unwrap_or_default())
    } else {
        (StatusCode::FORBIDDEN, String::new())
    }
}

async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if let Some(sig) = headers.get("X-Hub-Signature-256").and_then(|v| v.to_str().ok()) {
        if !verify_signature(&state.config.app_secret, &body, sig) {
            return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
        }
    }
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(json!({}))).into_response();
    };

    if let Some(entries) = value.get("entry").and_then(Value::as_array) {
        for entry in entries {
            let Some(messaging) = entry.get("messaging").and_then(Value::as_array) else {
                continue;
            };
            for item in messaging {
                handle_messaging_item(&state, item).await;
            }
        }
    }
    (StatusCode::OK, Json(json!({}))).into_response()
}

async fn handle_messaging_item(state: &Arc<WebhookState>, item: &Value) {
    let sender = item.pointer("/sender/id").and_then(Value::as_str).unwrap_or_default();
    let recipient = item.pointer("/recipient/id").and_then(Value::as_str).unwrap_or_default();

    if !passes_inbound_filter(&state.config.access, recipient, sender, sender) {
        return;
    }

    if let Some(postback) = item.get("postback") {
        let raw = postback.get("payload").and_then(Value::as_str).unwrap_or_default();
        let Some((button_id, payload)) = Button::decode_callback(raw) else {
            warn!(raw, "messenger postback with no colon separator, ignoring");
            return;
        };
        let click = ButtonClick {
            platform: Platform::FbMessenger,
            chat_id: sender.to_owned(),
            user_id: sender.to_owned(),
            message_id: item.pointer("/message/mid").and_then(Value::as_str).unwrap_or_default().to_owned(),
            button_id: button_id.to_owned(),
            data: payload.to_owned(),
        };
        state.sink.on_button(click).await;
        return;
    }

    let Some(message) = item.get("message") else { return };
    let text = message.get("text").and_then(Value::as_str).unwrap_or_default();
    let message_id = message.get("mid").and_then(Value::as_str).unwrap_or_default();

    let inbound = InboundMessage {
        message_id: message_id.to_owned(),
        platform: Platform::FbMessenger,
        chat_id: sender.to_owned(),
        thread_id: None,
        user_id: sender.to_owned(),
        user_name: String::new(),
        content: text.to_owned(),
        reply_to: None,
        timestamp: Utc::now(),
        is_mention: true,
        is_direct_message: true,
        metadata: std::collections::HashMap::new(),
    };
    state.sink.on_message(inbound).await;
}

fn send_payload(recipient_id: &str, message: &OutboundMessage) -> Value {
    if message.buttons.is_empty() {
        return json!({
            "recipient": { "id": recipient_id },
            "message": { "text": message.text },
        });
    }
    let buttons: Vec<Value> = message
        .buttons
        .iter()
        .take(MAX_TEMPLATE_BUTTONS)
        .map(|button| {
            json!({
                "type": "postback",
                "title": button.label,
                "payload": button.encode_callback(),
            })
        })
        .collect();
    json!({
        "recipient": { "id": recipient_id },
        "message": {
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "button",
                    "text": message.text,
                    "buttons": buttons,
                }
            }
        }
    })
}

/// Facebook Messenger Send API / webhook adapter.
pub struct MessengerAdapter {
    config: MessengerConfig,
    http: reqwest::Client,
}

impl MessengerAdapter {
    /// Construct an adapter from configuration.
    #[must_use]
    pub fn new(config: MessengerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Build the `axum` router mounting this adapter's webhook endpoints.
    #[must_use]
    pub fn router(self: &Arc<Self>, sink: Arc<dyn InboundSink>) -> Router {
        let state = Arc::new(WebhookState {
            config: self.config.clone(),
            sink,
        });
        Router::new()
            .route("/messenger/webhook", get(verify_handler).post(webhook_handler))
            .with_state(state)
    }
}

impl Adapter for MessengerAdapter {
    fn platform_tag(&self) -> Platform {
        Platform::FbMessenger
    }

    fn bot_user_id(&self) -> String {
        String::new()
    }

    fn start(&self, _sink: Arc<dyn InboundSink>, cancel: CancellationToken) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async move {
            info!("messenger adapter started, awaiting shutdown (served via shared http router)");
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
            let response: Value = self
                .http
                .post(SEND_URL)
                .query(&[("access_token", self.config.page_access_token.as_str())])
                .json(&send_payload(&chat_id, &message))
                .send()
                .await
                .map_err(|err| AppError::Adapter(format!("messenger send failed: {err}")))?
                .json()
                .await
                .map_err(|err| AppError::Adapter(format!("messenger send decode failed: {err}")))?;
            response
                .pointer("/message_id")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| AppError::Adapter("messenger send response missing message_id".into()))
        })
    }

    fn reply(
        &self,
        chat_id: &str,
        _reply_to: &str,
        message: OutboundMessage,
    ) -> AdapterFuture<'_, Result<String>> {
        self.send(chat_id, message)
    }

    fn edit(&self, _chat_id: &str, _message_id: &str, _message: OutboundMessage) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async {
            Err(AppError::Adapter(
                "messenger Send API does not support editing a sent message".into(),
            ))
        })
    }

    fn delete(&self, _chat_id: &str, _message_id: &str) -> AdapterFuture<'_, Result<()>> {
        Box::pin(async {
            Err(AppError::Adapter(
                "messenger Send API does not support deleting a sent message".into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_caps_at_three_buttons() {
        let buttons: Vec<Button> = (0..5)
            .map(|i| Button::new(i.to_string(), i.to_string(), crate::model::ButtonStyle::Primary, i.to_string()))
            .collect();
        let message = OutboundMessage::plain("pick one").with_buttons(buttons);
        let payload = send_payload("123", &message);
        let array = payload["message"]["attachment"]["payload"]["buttons"].as_array().unwrap();
        assert_eq!(array.len(), MAX_TEMPLATE_BUTTONS);
    }

    #[test]
    fn verify_signature_rejects_missing_prefix() {
        assert!(!verify_signature("secret", b"body", "not-prefixed"));
    }
}
