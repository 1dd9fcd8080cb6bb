//! Recording fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::capabilities::CapabilityProvider;
use crate::model::{Credentials, Keyboard, MediaFile, MediaKind, Update, UpdateKind};
use crate::storage::{ConfigStore, Store};
use crate::transport::{ChatTransport, OutgoingMedia, OutgoingText};

pub const AUTHORIZED_CHAT: &str = "1400";

pub async fn configured_store() -> Arc<Store> {
    let store = Store::open_in_memory().unwrap();
    store
        .set_credentials(&Credentials {
            bot_token: "123:abc".into(),
            authorized_chat_id: AUTHORIZED_CHAT.into(),
        })
        .await
        .unwrap();
    Arc::new(store)
}

pub fn text_update(update_id: i64, chat_id: &str, text: &str) -> Update {
    Update {
        update_id,
        kind: UpdateKind::Message,
        chat_id: Some(chat_id.to_string()),
        sub_channel: None,
        text: Some(text.to_string()),
        callback_data: None,
        callback_query_id: None,
    }
}

pub fn callback_update(update_id: i64, chat_id: Option<&str>, data: &str) -> Update {
    Update {
        update_id,
        kind: UpdateKind::CallbackQuery,
        chat_id: chat_id.map(str::to_string),
        sub_channel: None,
        text: None,
        callback_data: Some(data.to_string()),
        callback_query_id: Some(format!("cq-{}", update_id)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send(OutgoingText),
    Edit { message_id: i64, text: String },
    Media { kind: MediaKind, caption: Option<String> },
    Ack(String),
    DeleteSubChannel(i32),
}

struct TransportState {
    calls: Vec<Call>,
    fetch_offsets: Vec<i64>,
    batches: VecDeque<Result<Vec<Update>, String>>,
    next_message_id: i64,
    edit_ok: bool,
    fail_sends: bool,
    fail_acks: bool,
}

pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            state: Mutex::new(TransportState {
                calls: Vec::new(),
                fetch_offsets: Vec::new(),
                batches: VecDeque::new(),
                next_message_id: 100,
                edit_ok: true,
                fail_sends: false,
                fail_acks: false,
            }),
        }
    }
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fetch_offsets(&self) -> Vec<i64> {
        self.state.lock().unwrap().fetch_offsets.clone()
    }

    pub fn sent_texts(&self) -> Vec<(Option<i32>, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(msg) => Some((msg.sub_channel, msg.text)),
                _ => None,
            })
            .collect()
    }

    pub fn edited_ids(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Edit { message_id, .. } => Some(message_id),
                _ => None,
            })
            .collect()
    }

    pub fn set_edit_ok(&self, ok: bool) {
        self.state.lock().unwrap().edit_ok = ok;
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    pub fn fail_acks(&self) {
        self.state.lock().unwrap().fail_acks = true;
    }

    pub fn push_batch(&self, updates: Vec<Update>) {
        self.state.lock().unwrap().batches.push_back(Ok(updates));
    }

    pub fn push_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .batches
            .push_back(Err("connection reset".to_string()));
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn fetch_updates(&self, offset: i64, _timeout_secs: u64) -> Result<Vec<Update>> {
        let mut state = self.state.lock().unwrap();
        state.fetch_offsets.push(offset);
        match state.batches.pop_front() {
            Some(Ok(updates)) => Ok(updates),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Ok(Vec::new()),
        }
    }

    async fn send(&self, message: &OutgoingText) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Send(message.clone()));
        if state.fail_sends {
            anyhow::bail!("send failed");
        }
        state.next_message_id += 1;
        Ok(state.next_message_id)
    }

    async fn edit(
        &self,
        _chat_id: &str,
        message_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(state.edit_ok)
    }

    async fn send_media(&self, media: &OutgoingMedia) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Media {
            kind: media.kind,
            caption: media.caption.clone(),
        });
        Ok(!state.fail_sends)
    }

    async fn ack_callback(&self, callback_query_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Ack(callback_query_id.to_string()));
        if state.fail_acks {
            anyhow::bail!("ack failed");
        }
        Ok(())
    }

    async fn delete_sub_channel(&self, _chat_id: &str, sub_channel: i32) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteSubChannel(sub_channel));
        Ok(true)
    }
}

/// Records every invocation as `name(args)`.
#[derive(Default)]
pub struct FakeCapabilities {
    invocations: Mutex<Vec<String>>,
    fail: Mutex<bool>,
    hold_recordings: Mutex<bool>,
    shell_delay: Mutex<Option<Duration>>,
}

impl FakeCapabilities {
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn fail_all(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Recordings run until stopped instead of returning immediately.
    pub fn hold_recordings(&self) {
        *self.hold_recordings.lock().unwrap() = true;
    }

    /// Shell commands take `delay` before returning.
    pub fn delay_shell(&self, delay: Duration) {
        *self.shell_delay.lock().unwrap() = Some(delay);
    }

    fn record(&self, call: String) -> Result<()> {
        self.invocations.lock().unwrap().push(call);
        if *self.fail.lock().unwrap() {
            anyhow::bail!("device busy");
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityProvider for FakeCapabilities {
    async fn status(&self) -> String {
        "🔋 Battery: 80%".to_string()
    }

    async fn location(&self) -> Result<String> {
        self.record("location()".into())?;
        Ok("📍 Location: 1,2".into())
    }

    async fn set_flashlight(&self, on: bool) -> Result<()> {
        self.record(format!("flashlight({})", on))
    }

    async fn vibrate(&self, duration_ms: u64) -> Result<()> {
        self.record(format!("vibrate({})", duration_ms))
    }

    async fn record_audio(
        &self,
        duration_secs: u64,
        mut stop: watch::Receiver<bool>,
    ) -> Result<MediaFile> {
        self.record(format!("record_audio({})", duration_secs))?;
        let hold = *self.hold_recordings.lock().unwrap();
        if hold {
            let _ = stop.wait_for(|stopped| *stopped).await;
        }
        Ok(MediaFile {
            file_name: "recording.wav".into(),
            bytes: vec![1, 2, 3],
        })
    }

    async fn list_apps(&self) -> Result<String> {
        self.record("list_apps()".into())?;
        Ok("Maps\nCamera".into())
    }

    async fn network_info(&self) -> Result<String> {
        self.record("network_info()".into())?;
        Ok("📶 Network Status:\nType: Wi-Fi".into())
    }

    async fn memory_info(&self) -> Result<String> {
        self.record("memory_info()".into())?;
        Ok("💾 Memory Info".into())
    }

    async fn take_photo(&self, camera_id: &str) -> Result<MediaFile> {
        self.record(format!("take_photo({})", camera_id))?;
        Ok(MediaFile {
            file_name: "snap.jpg".into(),
            bytes: vec![0xff, 0xd8],
        })
    }

    async fn clipboard(&self) -> Result<String> {
        self.record("clipboard()".into())?;
        Ok("copied text".into())
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        self.record(format!("set_volume({})", percent))
    }

    async fn shell(&self, cmdline: &str) -> Result<String> {
        self.record(format!("shell({})", cmdline))?;
        let delay = *self.shell_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok("output".into())
    }

    async fn launch_app(&self, name: &str) -> Result<String> {
        self.record(format!("launch_app({})", name))?;
        Ok(format!("Launched {}", name))
    }

    async fn list_files(&self, path: &str) -> Result<String> {
        self.record(format!("list_files({})", path))?;
        Ok("📁 DCIM".into())
    }

    async fn read_file(&self, path: &str) -> Result<MediaFile> {
        self.record(format!("read_file({})", path))?;
        Ok(MediaFile {
            file_name: "file.txt".into(),
            bytes: b"data".to_vec(),
        })
    }

    async fn show_alert(&self, text: &str) -> Result<()> {
        self.record(format!("show_alert({})", text))
    }

    async fn speak(&self, text: &str) -> Result<()> {
        self.record(format!("speak({})", text))
    }
}
