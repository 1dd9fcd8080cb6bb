pub mod host;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::MediaFile;

/// Device actions the router can invoke. `Err` is a capability failure and
/// is reported to the operator as a reply.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Multi-line status block embedded in the dashboard.
    async fn status(&self) -> String;
    async fn location(&self) -> Result<String>;
    async fn set_flashlight(&self, on: bool) -> Result<()>;
    async fn vibrate(&self, duration_ms: u64) -> Result<()>;
    /// Records until `duration_secs` elapse or `stop` flips to `true`.
    async fn record_audio(
        &self,
        duration_secs: u64,
        stop: watch::Receiver<bool>,
    ) -> Result<MediaFile>;
    async fn list_apps(&self) -> Result<String>;
    async fn network_info(&self) -> Result<String>;
    async fn memory_info(&self) -> Result<String>;
    async fn take_photo(&self, camera_id: &str) -> Result<MediaFile>;
    async fn clipboard(&self) -> Result<String>;
    async fn set_volume(&self, percent: u8) -> Result<()>;
    async fn shell(&self, cmdline: &str) -> Result<String>;
    async fn launch_app(&self, name: &str) -> Result<String>;
    async fn list_files(&self, path: &str) -> Result<String>;
    async fn read_file(&self, path: &str) -> Result<MediaFile>;
    async fn show_alert(&self, text: &str) -> Result<()>;
    async fn speak(&self, text: &str) -> Result<()>;
}
