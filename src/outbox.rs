//! Fail-soft outbound path. Every send resolves the credentials first and
//! degrades to `None` / `false` when they are missing or the transport fails,
//! so callers never have to handle transport errors themselves.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::model::{Keyboard, MediaFile, MediaKind, TextFormat};
use crate::storage::ConfigStore;
use crate::transport::{ChatTransport, OutgoingMedia, OutgoingText};

/// Telegram caps messages at 4096 chars
const MAX_MESSAGE_LEN: usize = 4000;

/// Split long messages, preferring newline then space boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

pub struct Outbox {
    transport: Arc<dyn ChatTransport>,
    settings: Arc<dyn ConfigStore>,
}

impl Outbox {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: Arc<dyn ConfigStore>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// The authorized chat, or `None` when outbound traffic is disabled.
    async fn target_chat(&self) -> Option<String> {
        match self.settings.credentials().await {
            Ok(creds) if creds.is_complete() => Some(creds.authorized_chat_id.trim().to_string()),
            Ok(_) => {
                debug!("Credentials incomplete, outbound message dropped");
                None
            }
            Err(e) => {
                error!("Failed to read credentials: {:#}", e);
                None
            }
        }
    }

    async fn send(&self, message: OutgoingText) -> Option<i64> {
        match self.transport.send(&message).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Send failed: {:#}", e);
                None
            }
        }
    }

    /// Markdown reply, split when it exceeds the message limit. Returns the
    /// id of the last chunk sent.
    pub async fn reply(&self, sub_channel: Option<i32>, text: &str) -> Option<i64> {
        self.reply_as(sub_channel, text, TextFormat::Markdown).await
    }

    /// Verbatim text for device output that may contain markup characters.
    pub async fn reply_plain(&self, sub_channel: Option<i32>, text: &str) -> Option<i64> {
        self.reply_as(sub_channel, text, TextFormat::Plain).await
    }

    async fn reply_as(
        &self,
        sub_channel: Option<i32>,
        text: &str,
        format: TextFormat,
    ) -> Option<i64> {
        let chat_id = self.target_chat().await?;
        let mut last = None;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            last = self
                .send(OutgoingText {
                    chat_id: chat_id.clone(),
                    text: chunk,
                    sub_channel,
                    keyboard: None,
                    format,
                })
                .await;
        }
        last
    }

    pub async fn send_panel(
        &self,
        sub_channel: Option<i32>,
        text: &str,
        keyboard: Keyboard,
    ) -> Option<i64> {
        let chat_id = self.target_chat().await?;
        self.send(OutgoingText {
            chat_id,
            text: text.to_string(),
            sub_channel,
            keyboard: Some(keyboard),
            format: TextFormat::Markdown,
        })
        .await
    }

    /// `false` on any failure, including a rejected edit.
    pub async fn edit_panel(&self, message_id: i64, text: &str, keyboard: &Keyboard) -> bool {
        let Some(chat_id) = self.target_chat().await else {
            return false;
        };
        match self
            .transport
            .edit(&chat_id, message_id, text, Some(keyboard))
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Edit of message {} failed: {:#}", message_id, e);
                false
            }
        }
    }

    pub async fn send_media(
        &self,
        sub_channel: Option<i32>,
        kind: MediaKind,
        file: MediaFile,
        caption: Option<String>,
    ) -> bool {
        let Some(chat_id) = self.target_chat().await else {
            return false;
        };
        let media = OutgoingMedia {
            chat_id,
            kind,
            file_name: file.file_name,
            bytes: file.bytes,
            caption,
            sub_channel,
        };
        match self.transport.send_media(&media).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Media upload failed: {:#}", e);
                false
            }
        }
    }

    /// Best-effort; failures are only logged.
    pub async fn ack_callback(&self, callback_query_id: &str) {
        if let Err(e) = self.transport.ack_callback(callback_query_id).await {
            debug!("Callback ack failed: {:#}", e);
        }
    }

    pub async fn delete_sub_channel(&self, sub_channel: i32) -> bool {
        let Some(chat_id) = self.target_chat().await else {
            return false;
        };
        match self.transport.delete_sub_channel(&chat_id, sub_channel).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Deleting sub-channel {} failed: {:#}", sub_channel, e);
                false
            }
        }
    }
}
