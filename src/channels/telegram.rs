//! Telegram channel: Bot API client plus the long-poll update stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

use crate::channels::updates::{InboundEvent, decode_update};
use crate::channels::{Button, ChatPlatform, Keyboard, MediaKind, MediaSource};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const CHANNEL_NAME: &str = "telegram";

/// Inbound events, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another Bot API server (a local one, or a mock).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// POST a JSON call and unwrap the Bot API envelope.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(method, e))?;
        read_envelope(method, resp).await
    }

    async fn call_multipart(&self, method: &str, form: Form) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_failed(method, e))?;
        read_envelope(method, resp).await
    }

    /// Call with `parse_mode: Markdown`, retrying as plain text when Telegram
    /// rejects the formatting.
    async fn call_markdown(&self, method: &str, mut body: Value) -> Result<Value, ChannelError> {
        body["parse_mode"] = Value::String("Markdown".into());
        match self.call(method, &body).await {
            Err(ChannelError::Api { code: 400, description, .. })
                if description.contains("parse entities") =>
            {
                tracing::warn!(method, "Markdown rejected; retrying without parse_mode");
                if let Some(obj) = body.as_object_mut() {
                    obj.remove("parse_mode");
                }
                self.call(method, &body).await
            }
            other => other,
        }
    }

    /// Check the token against `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })
    }

    /// Long-poll `getUpdates` in a background task and yield decoded events.
    ///
    /// Any webhook registered for the bot is removed first, since Telegram
    /// refuses `getUpdates` while one is set.
    pub async fn poll_updates(&self) -> Result<EventStream, ChannelError> {
        self.call("deleteWebhook", &json!({}))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let results = match channel.call("getUpdates", &body).await {
                    Ok(Value::Array(results)) => results,
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in &results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    match decode_update(update) {
                        Ok(Some(event)) => {
                            if tx.send(event).is_err() {
                                tracing::info!("Telegram listener channel closed");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Skipping undecodable update: {e}"),
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ChatPlatform for TelegramChannel {
    /// Splits long text; controls go on the last chunk only.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        let mut message_id = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if i == last {
                if let Some(keyboard) = keyboard {
                    body["reply_markup"] = keyboard_json(keyboard);
                }
            }
            let sent = self.call_markdown("sendMessage", body).await?;
            message_id = sent.get("message_id").and_then(Value::as_i64).unwrap_or(0);
        }
        Ok(message_id)
    }

    async fn send_media(
        &self,
        chat_id: &str,
        kind: MediaKind,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let (method, field) = match kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Document => ("sendDocument", "document"),
        };

        match source {
            MediaSource::Reference(reference) => {
                let mut body = json!({ "chat_id": chat_id, field: reference });
                if let Some(cap) = caption {
                    body["caption"] = Value::String(cap.to_string());
                }
                self.call_markdown(method, body).await?;
            }
            MediaSource::Bytes { data, file_name } => {
                let part = Part::bytes(data.clone()).file_name(file_name.clone());
                let mut form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .part(field, part);
                if let Some(cap) = caption {
                    form = form.text("caption", cap.to_string());
                }
                self.call_multipart(method, form).await?;
            }
        }

        tracing::debug!(chat_id, method, "Telegram media sent");
        Ok(())
    }

    async fn edit_message_controls(
        &self,
        chat_id: &str,
        message_id: i64,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let markup = keyboard
            .map(keyboard_json)
            .unwrap_or_else(|| json!({ "inline_keyboard": [] }));
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": markup,
        });

        match self.call("editMessageReplyMarkup", &body).await {
            // Already in the requested state.
            Err(ChannelError::Api { description, .. })
                if description.contains("message is not modified") =>
            {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn set_menu_button(
        &self,
        chat_id: &str,
        label: &str,
        web_app_url: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "menu_button": {
                "type": "web_app",
                "text": label,
                "web_app": { "url": web_app_url }
            }
        });
        self.call("setChatMenuButton", &body).await.map(|_| ())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", &body).await.map(|_| ())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn send_failed(method: &str, e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason: format!("{method}: {e}"),
    }
}

/// Unwrap `{ok, result}` or turn `{ok: false, error_code, description}` into
/// [`ChannelError::Api`].
async fn read_envelope(method: &str, resp: reqwest::Response) -> Result<Value, ChannelError> {
    let status = resp.status();
    let envelope: Value = resp.json().await.map_err(|e| ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason: format!("{method}: unreadable response ({status}): {e}"),
    })?;

    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(envelope.get("result").cloned().unwrap_or(Value::Null));
    }

    let code = envelope
        .get("error_code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(status.as_u16());
    let description = envelope
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if code == 429 {
        return Err(ChannelError::RateLimited {
            name: CHANNEL_NAME.into(),
        });
    }
    Err(ChannelError::Api {
        name: CHANNEL_NAME.into(),
        code,
        description,
    })
}

fn keyboard_json(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Inline(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| match button {
                            Button::Url { label, url } => json!({ "text": label, "url": url }),
                            Button::Callback { label, data } => {
                                json!({ "text": label, "callback_data": data })
                            }
                        })
                        .collect()
                })
                .collect();
            json!({ "inline_keyboard": rows })
        }
        Keyboard::Menu(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
                .collect();
            json!({ "keyboard": rows, "resize_keyboard": true })
        }
    }
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let cut = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    /// Minimal Bot API stand-in: rejects Markdown, blocks chat "666".
    async fn mock_bot_api(
        State(calls): State<Calls>,
        Path((_token, method)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        calls.lock().unwrap().push((method.clone(), body.clone()));

        if body.get("chat_id").and_then(Value::as_str) == Some("666") {
            return Json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            }));
        }
        if body.get("parse_mode").is_some() && method == "sendMessage" {
            return Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: unclosed bold"
            }));
        }
        Json(json!({ "ok": true, "result": { "message_id": 77 } }))
    }

    async fn spawn_mock() -> (TelegramChannel, Calls) {
        let calls: Calls = Arc::default();
        let app = Router::new()
            .route("/{token}/{method}", post(mock_bot_api))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let channel = TelegramChannel::new("TOKEN".into()).with_api_base(format!("http://{addr}"));
        (channel, calls)
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
        let ch = ch.with_api_base("http://localhost:8081/");
        assert_eq!(ch.api_url("getMe"), "http://localhost:8081/bot123:ABC/getMe");
    }

    #[test]
    fn inline_keyboard_json() {
        let keyboard = Keyboard::Inline(vec![vec![
            Button::url("Open", "https://example.com"),
            Button::callback("✅", "fact:ok:1"),
        ]]);
        assert_eq!(
            keyboard_json(&keyboard),
            json!({"inline_keyboard": [[
                {"text": "Open", "url": "https://example.com"},
                {"text": "✅", "callback_data": "fact:ok:1"}
            ]]})
        );
    }

    #[test]
    fn menu_keyboard_json() {
        let keyboard = Keyboard::Menu(vec![vec!["A".into(), "B".into()]]);
        assert_eq!(
            keyboard_json(&keyboard),
            json!({"keyboard": [[{"text": "A"}, {"text": "B"}]], "resize_keyboard": true})
        );
    }

    #[tokio::test]
    async fn markdown_rejection_falls_back_to_plain() {
        let (channel, calls) = spawn_mock().await;
        let id = channel.send_text("42", "*broken", None).await.unwrap();
        assert_eq!(id, 77);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.get("parse_mode").is_some());
        assert!(calls[1].1.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn blocked_recipient_is_a_permanent_api_error() {
        let (channel, _calls) = spawn_mock().await;
        let err = channel.send_text("666", "hi", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::Api { code: 403, .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn controls_go_on_the_last_chunk() {
        let (channel, calls) = spawn_mock().await;
        let long = format!("{}\n{}", "a".repeat(4000), "b".repeat(200));
        let keyboard = Keyboard::Inline(vec![vec![Button::url("Go", "https://x.io")]]);
        channel.send_text("42", &long, Some(&keyboard)).await.unwrap();

        let calls = calls.lock().unwrap();
        // Each chunk is tried with Markdown, then plain.
        let plain: Vec<_> = calls.iter().filter(|(_, b)| b.get("parse_mode").is_none()).collect();
        assert_eq!(plain.len(), 2);
        assert!(plain[0].1.get("reply_markup").is_none());
        assert!(plain[1].1.get("reply_markup").is_some());
    }

    #[tokio::test]
    async fn menu_button_request_shape() {
        let (channel, calls) = spawn_mock().await;
        channel
            .set_menu_button("7", "Admin Panel", "https://admin.example.com")
            .await
            .unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "setChatMenuButton");
        assert_eq!(calls[0].1["menu_button"]["type"], "web_app");
        assert_eq!(calls[0].1["menu_button"]["web_app"]["url"], "https://admin.example.com");
    }

    #[tokio::test]
    async fn unreachable_server_is_send_failed() {
        let channel = TelegramChannel::new("TOKEN".into()).with_api_base("http://127.0.0.1:9");
        let err = channel.answer_callback("cb", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
        assert!(!err.is_permanent());
    }

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_over_limit_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // "ж" is two bytes; 4096 lands mid-char after an odd prefix.
        let msg = format!("x{}", "ж".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.concat(), msg);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
    }
}
