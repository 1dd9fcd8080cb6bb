use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Written into the settings store at startup when non-empty
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub authorized_chat_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_idle_delay_secs")]
    pub idle_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_sync_cron")]
    pub cron: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_files_root")]
    pub files_root: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Shell commands still running after this are killed
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub announce_online: bool,
    #[serde(default = "default_record_secs")]
    pub default_record_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            authorized_chat_id: String::new(),
            api_base_url: default_api_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            idle_delay_secs: default_idle_delay_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cron: default_sync_cron(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            files_root: default_files_root(),
            shell: default_shell(),
            shell_timeout_secs: default_shell_timeout_secs(),
            announce_online: true,
            default_record_secs: default_record_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_idle_delay_secs() -> u64 {
    2
}

fn default_db_path() -> PathBuf {
    PathBuf::from("commander.db")
}

fn default_sync_cron() -> String {
    // every 15 minutes, seconds field first
    "0 */15 * * * *".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_files_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_shell_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_record_secs() -> u64 {
    10
}

impl TelegramConfig {
    /// Long-poll timeout in seconds, kept within what the Bot API accepts.
    pub fn poll_timeout(&self) -> u64 {
        self.poll_timeout_secs.clamp(1, 50)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.sync.batch_size == 0 {
            anyhow::bail!("sync.batch_size must be at least 1");
        }
        Ok(config)
    }
}
