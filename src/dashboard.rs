use std::sync::Arc;

use tracing::{error, info, warn};

use crate::capabilities::CapabilityProvider;
use crate::model::{Button, DashboardState, Keyboard, GENERAL_SUB_CHANNEL};
use crate::outbox::Outbox;
use crate::storage::ConfigStore;

pub const FIRST_PAGE: u8 = 1;
pub const LAST_PAGE: u8 = 2;

/// Out-of-range page numbers clamp to the nearest valid page.
pub fn clamp_page(page: i32) -> u8 {
    page.clamp(FIRST_PAGE as i32, LAST_PAGE as i32) as u8
}

/// Dashboards are keyed by the sub-channel a command came from; commands from
/// the General area share one dashboard.
fn dashboard_key(sub_channel: Option<i32>) -> i32 {
    sub_channel.unwrap_or(GENERAL_SUB_CHANNEL)
}

/// Static button layout per page. Callback data are plain command strings.
pub fn render_buttons(page: u8) -> Keyboard {
    let rows = if clamp_page(page as i32) == FIRST_PAGE {
        vec![
            vec![
                Button::new("🔄 Refresh", "refresh"),
                Button::new("📍 Location", "location"),
                Button::new("📋 Clipboard", "/clipboard"),
            ],
            vec![
                Button::new("💡 ON", "flashlight_on"),
                Button::new("💡 OFF", "flashlight_off"),
                Button::new("📸 Back", "photo_back"),
                Button::new("📸 Front", "photo_front"),
            ],
            vec![
                Button::new("🎙 Record", "record"),
                Button::new("🔊 Max", "vol_max"),
                Button::new("🔇 Mute", "vol_mute"),
                Button::new("📳 Buzz", "vibrate"),
            ],
            vec![
                Button::new("📦 Apps", "apps"),
                Button::new("📡 Net", "network"),
                Button::new("💾 Mem", "memory"),
            ],
            vec![
                Button::new("🧹 Wipe Logs", "wipe"),
                Button::new("🛑 Stop All", "stop"),
                Button::new("➡️ More", "next_page"),
            ],
        ]
    } else {
        vec![
            vec![
                Button::new("📂 List /", "ls /"),
                Button::new("📂 List /tmp", "ls /tmp"),
            ],
            vec![
                Button::new("🗣 Hello", "say Hello Commander"),
                Button::new("🚨 Test Alert", "alert Remote Test"),
            ],
            vec![
                Button::new("🚀 Browser", "launch Firefox"),
                Button::new("🚀 Terminal", "launch Terminal"),
            ],
            vec![
                Button::new("⬅️ Back", "prev_page"),
                Button::new("🛑 Stop All", "stop"),
            ],
        ]
    };
    Keyboard { rows }
}

/// Keeps one live status message per sub-channel, editing it in place and
/// sending a replacement whenever an edit is rejected.
pub struct DashboardEngine {
    outbox: Arc<Outbox>,
    settings: Arc<dyn ConfigStore>,
    capabilities: Arc<dyn CapabilityProvider>,
}

impl DashboardEngine {
    pub fn new(
        outbox: Arc<Outbox>,
        settings: Arc<dyn ConfigStore>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        Self {
            outbox,
            settings,
            capabilities,
        }
    }

    pub async fn render_text(&self, page: u8) -> String {
        let status = self.capabilities.status().await;
        format!(
            "📡 *COMMANDER DASHBOARD* (Page {}/{})\n\
             ────────────────────\n\
             {}\n\
             ────────────────────\n\
             ⏰ _Last Sync: {}_",
            clamp_page(page as i32),
            LAST_PAGE,
            status,
            chrono::Local::now().format("%H:%M:%S")
        )
    }

    async fn load_state(&self, key: i32) -> DashboardState {
        match self.settings.dashboard_state(key).await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to load dashboard state for {}: {:#}", key, e);
                DashboardState::none(key)
            }
        }
    }

    async fn save_state(&self, state: DashboardState) {
        if let Err(e) = self.settings.set_dashboard_state(&state).await {
            error!("Failed to store dashboard state: {:#}", e);
        }
    }

    /// Show `page`, editing the live dashboard unless `force_new` is set.
    pub async fn show(&self, sub_channel: Option<i32>, force_new: bool, page: u8) {
        let page = clamp_page(page as i32);
        let text = self.render_text(page).await;
        self.present(sub_channel, force_new, page, text).await;
    }

    /// Page 1 with an optional extra status line.
    pub async fn show_status(&self, sub_channel: Option<i32>, extra: Option<&str>) {
        let state = self.load_state(dashboard_key(sub_channel)).await;
        let mut text = self.render_text(FIRST_PAGE).await;
        // A freshly sent dashboard carries the status line too.
        if let Some(extra) = extra {
            text.push_str("\n\n");
            text.push_str(extra);
        }
        self.present(sub_channel, !state.is_live(), FIRST_PAGE, text)
            .await;
    }

    pub async fn next_page(&self, sub_channel: Option<i32>) {
        self.turn_page(sub_channel, 1).await;
    }

    pub async fn prev_page(&self, sub_channel: Option<i32>) {
        self.turn_page(sub_channel, -1).await;
    }

    async fn turn_page(&self, sub_channel: Option<i32>, delta: i32) {
        let state = self.load_state(dashboard_key(sub_channel)).await;
        let current = if state.is_live() { state.page } else { FIRST_PAGE };
        let target = clamp_page(current as i32 + delta);
        self.show(sub_channel, false, target).await;
    }

    /// Drop the dashboard identity of a sub-channel that no longer exists.
    pub async fn forget(&self, sub_channel: i32) {
        if let Err(e) = self.settings.clear_dashboard_state(sub_channel).await {
            error!("Failed to clear dashboard state: {:#}", e);
        }
    }

    async fn present(&self, sub_channel: Option<i32>, force_new: bool, page: u8, text: String) {
        let key = dashboard_key(sub_channel);
        let state = self.load_state(key).await;
        let keyboard = render_buttons(page);

        if !force_new && state.is_live() {
            if self
                .outbox
                .edit_panel(state.message_id, &text, &keyboard)
                .await
            {
                self.save_state(DashboardState { page, ..state }).await;
                return;
            }
            info!(
                "Dashboard {} in sub-channel {} is stale, sending a new one",
                state.message_id, key
            );
            // a failed resend must not leave us editing the stale id
            self.forget(key).await;
        }

        match self.outbox.send_panel(sub_channel, &text, keyboard).await {
            Some(message_id) => {
                self.save_state(DashboardState {
                    sub_channel: key,
                    message_id,
                    page,
                })
                .await
            }
            None => warn!("Dashboard for sub-channel {} could not be sent", key),
        }
    }
}
