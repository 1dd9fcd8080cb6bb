pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Keyboard, MediaKind, TextFormat, Update};

/// An outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub chat_id: String,
    pub text: String,
    pub sub_channel: Option<i32>,
    pub keyboard: Option<Keyboard>,
    pub format: TextFormat,
}

/// An outbound photo or document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub chat_id: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
    pub sub_channel: Option<i32>,
}

/// The chat provider as seen by the core. Any `Err` is a transient transport
/// failure; the caller decides whether to retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Long poll for updates with `update_id >= offset`.
    async fn fetch_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>>;

    /// Returns the new message id.
    async fn send(&self, message: &OutgoingText) -> Result<i64>;

    /// `Ok(false)` when the provider rejected the edit.
    async fn edit(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<bool>;

    async fn send_media(&self, media: &OutgoingMedia) -> Result<bool>;

    async fn ack_callback(&self, callback_query_id: &str) -> Result<()>;

    async fn delete_sub_channel(&self, chat_id: &str, sub_channel: i32) -> Result<bool>;
}
