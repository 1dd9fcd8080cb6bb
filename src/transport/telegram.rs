//! Telegram Bot API transport over plain HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ChatTransport, OutgoingMedia, OutgoingText};
use crate::config::TelegramConfig;
use crate::model::{Keyboard, MediaKind, TextFormat, Update, UpdateKind};
use crate::storage::ConfigStore;

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    text: Option<String>,
    message_thread_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    message: Option<TgMessage>,
    data: Option<String>,
}

impl TgUpdate {
    /// Project the raw payload onto the fields the core uses.
    fn normalize(self) -> Update {
        if let Some(query) = self.callback_query {
            let (chat_id, sub_channel) = match &query.message {
                Some(msg) => (Some(msg.chat.id.to_string()), msg.message_thread_id),
                None => (None, None),
            };
            return Update {
                update_id: self.update_id,
                kind: UpdateKind::CallbackQuery,
                chat_id,
                sub_channel,
                text: None,
                callback_data: query.data,
                callback_query_id: Some(query.id),
            };
        }

        let (chat_id, sub_channel, text) = match self.message {
            Some(msg) => (
                Some(msg.chat.id.to_string()),
                msg.message_thread_id,
                msg.text,
            ),
            None => (None, None, None),
        };
        Update {
            update_id: self.update_id,
            kind: UpdateKind::Message,
            chat_id,
            sub_channel,
            text,
            callback_data: None,
            callback_query_id: None,
        }
    }
}

fn keyboard_json(keyboard: &Keyboard) -> serde_json::Value {
    json!({ "inline_keyboard": keyboard.rows })
}

fn parse_mode(format: TextFormat) -> Option<&'static str> {
    match format {
        TextFormat::Plain => None,
        TextFormat::Markdown => Some("Markdown"),
    }
}

pub struct TelegramTransport {
    client: Client,
    base_url: String,
    settings: Arc<dyn ConfigStore>,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig, settings: Arc<dyn ConfigStore>) -> Result<Self> {
        // Must outlive the long poll itself.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout() + 20))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            settings,
        })
    }

    async fn method_url(&self, method: &str) -> Result<String> {
        let creds = self.settings.credentials().await?;
        let token = creds.bot_token.trim();
        if token.is_empty() {
            anyhow::bail!("bot token is not configured");
        }
        Ok(format!("{}/bot{}/{}", self.base_url, token, method))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<TgResponse<T>> {
        let url = self.method_url(method).await?;
        let resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;

        let status = resp.status();
        let body: TgResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("{} returned unreadable body (HTTP {})", method, status))?;
        Ok(body)
    }

    async fn call_ok<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T> {
        let body = self.call::<T>(method, payload).await?;
        if !body.ok {
            anyhow::bail!(
                "{} failed: {}",
                method,
                body.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        body.result
            .with_context(|| format!("{} returned no result", method))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let raw: Vec<TgUpdate> = self
            .call_ok(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        debug!("getUpdates returned {} item(s)", raw.len());
        Ok(raw.into_iter().map(TgUpdate::normalize).collect())
    }

    async fn send(&self, message: &OutgoingText) -> Result<i64> {
        let mut payload = json!({
            "chat_id": message.chat_id,
            "text": message.text,
        });
        if let Some(mode) = parse_mode(message.format) {
            payload["parse_mode"] = json!(mode);
        }
        if let Some(thread_id) = message.sub_channel {
            payload["message_thread_id"] = json!(thread_id);
        }
        if let Some(keyboard) = &message.keyboard {
            payload["reply_markup"] = keyboard_json(keyboard);
        }

        let sent: TgMessage = self.call_ok("sendMessage", payload).await?;
        Ok(sent.message_id)
    }

    async fn edit(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<bool> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard_json(keyboard);
        }

        let body = self
            .call::<serde_json::Value>("editMessageText", payload)
            .await?;
        if body.ok {
            return Ok(true);
        }
        let description = body.description.unwrap_or_default();
        // Identical content is still the live dashboard.
        if description.contains("message is not modified") {
            return Ok(true);
        }
        debug!("editMessageText rejected: {}", description);
        Ok(false)
    }

    async fn send_media(&self, media: &OutgoingMedia) -> Result<bool> {
        let (method, field) = match media.kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Document => ("sendDocument", "document"),
        };
        let url = self.method_url(method).await?;

        let part = Part::bytes(media.bytes.clone()).file_name(media.file_name.clone());
        let mut form = Form::new()
            .text("chat_id", media.chat_id.clone())
            .part(field, part);
        if let Some(caption) = &media.caption {
            form = form.text("caption", caption.clone());
        }
        if let Some(thread_id) = media.sub_channel {
            form = form.text("message_thread_id", thread_id.to_string());
        }

        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;
        let body: TgResponse<serde_json::Value> = resp
            .json()
            .await
            .with_context(|| format!("{} returned unreadable body", method))?;
        Ok(body.ok)
    }

    async fn ack_callback(&self, callback_query_id: &str) -> Result<()> {
        let _: bool = self
            .call_ok(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }

    async fn delete_sub_channel(&self, chat_id: &str, sub_channel: i32) -> Result<bool> {
        let body = self
            .call::<bool>(
                "deleteForumTopic",
                json!({ "chat_id": chat_id, "message_thread_id": sub_channel }),
            )
            .await?;
        Ok(body.ok && body.result.unwrap_or(false))
    }
}
