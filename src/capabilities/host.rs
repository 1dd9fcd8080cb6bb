//! Capabilities of a Linux host, backed by procfs/sysfs and common CLI tools
//! (`arecord`, `fswebcam`, `amixer`, `espeak`, `notify-send`, `xclip`).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

use super::CapabilityProvider;
use crate::config::DeviceConfig;
use crate::model::MediaFile;

/// Telegram message limit, minus room for the reply header.
const MAX_OUTPUT_CHARS: usize = 4000;

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Resolves `requested` inside `root` and rejects anything that escapes it.
fn validate_root_path(root: &Path, requested: &str) -> Result<PathBuf> {
    let root_canonical = root
        .canonicalize()
        .with_context(|| format!("Files root not found: {}", root.display()))?;

    let requested_path = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        root.join(requested)
    };

    let canonical = requested_path
        .canonicalize()
        .with_context(|| format!("Path not found: {}", requested))?;

    if !canonical.starts_with(&root_canonical) {
        anyhow::bail!(
            "Access denied: '{}' is outside '{}'",
            requested,
            root.display()
        );
    }
    Ok(canonical)
}

/// Runs a program and returns its stdout, failing on a non-zero exit.
async fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} exited with {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn scratch_file(prefix: &str, ext: &str) -> PathBuf {
    let stamp = chrono::Utc::now().timestamp_millis();
    std::env::temp_dir().join(format!("{}_{}.{}", prefix, stamp, ext))
}

async fn take_file(path: &Path) -> Result<MediaFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let _ = tokio::fs::remove_file(path).await;
    Ok(MediaFile {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string()),
        bytes,
    })
}

/// Values from /proc/meminfo in kB.
fn meminfo_value(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with(key) && line[key.len()..].starts_with(':'))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

/// Counts one running recording for as long as it is alive. A stopped
/// recording may still be winding down while its replacement starts.
struct ActiveRecording<'a>(&'a AtomicUsize);

impl<'a> ActiveRecording<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveRecording<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct HostCapabilities {
    files_root: PathBuf,
    shell: String,
    shell_timeout: Duration,
    recordings: AtomicUsize,
}

impl HostCapabilities {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            files_root: config.files_root.clone(),
            shell: config.shell.clone(),
            shell_timeout: Duration::from_secs(config.shell_timeout_secs.max(1)),
            recordings: AtomicUsize::new(0),
        }
    }

    async fn desktop_entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir("/usr/share/applications")
            .await
            .context("No application directory on this host")?;

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let name = content
                .lines()
                .find_map(|l| l.strip_prefix("Name="))
                .unwrap_or_default()
                .to_string();
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if !name.is_empty() {
                entries.push((name, id));
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn torch_led(&self) -> Result<PathBuf> {
        let mut read_dir = tokio::fs::read_dir("/sys/class/leds")
            .await
            .context("No LED class on this host")?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.contains("torch") || name.contains("flash") {
                return Ok(entry.path().join("brightness"));
            }
        }
        anyhow::bail!("No flashlight LED found")
    }
}

#[async_trait]
impl CapabilityProvider for HostCapabilities {
    async fn status(&self) -> String {
        let battery = tokio::fs::read_to_string("/sys/class/power_supply/BAT0/capacity")
            .await
            .map(|v| format!("{}%", v.trim()))
            .unwrap_or_else(|_| "n/a".to_string());
        let load = tokio::fs::read_to_string("/proc/loadavg")
            .await
            .ok()
            .and_then(|v| v.split_whitespace().next().map(str::to_string))
            .unwrap_or_else(|| "n/a".to_string());
        let monitoring = if self.recordings.load(Ordering::SeqCst) > 0 {
            "Active"
        } else {
            "Idle"
        };

        format!(
            "🔋 Battery: {}\n⚙️ Load: {}\n🤖 Service: Running\n🎤 Monitoring: {}",
            battery, load, monitoring
        )
    }

    async fn location(&self) -> Result<String> {
        anyhow::bail!("Location unknown: no positioning source on this host")
    }

    async fn set_flashlight(&self, on: bool) -> Result<()> {
        let led = self.torch_led().await?;
        tokio::fs::write(&led, if on { "1" } else { "0" })
            .await
            .with_context(|| format!("Failed to write {}", led.display()))?;
        Ok(())
    }

    async fn vibrate(&self, duration_ms: u64) -> Result<()> {
        anyhow::bail!("No vibration motor on this host ({} ms requested)", duration_ms)
    }

    async fn record_audio(
        &self,
        duration_secs: u64,
        mut stop: watch::Receiver<bool>,
    ) -> Result<MediaFile> {
        let path = scratch_file("recording", "wav");
        let path_arg = path.to_string_lossy().to_string();
        let secs = duration_secs.to_string();

        let mut child = Command::new("arecord")
            .args(["-q", "-f", "cd", "-d", secs.as_str(), path_arg.as_str()])
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start arecord")?;
        let active = ActiveRecording::start(&self.recordings);
        info!("Recording {}s to {}", duration_secs, path.display());

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = stop.wait_for(|stopped| *stopped) => None,
        };
        let finished = match waited {
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(anyhow::anyhow!("arecord exited with {}", status)),
            Some(Err(e)) => Err(e).context("arecord failed"),
            None => {
                info!("Recording stopped early");
                child.kill().await.context("Failed to stop arecord")
            }
        };
        drop(active);
        finished?;

        take_file(&path).await
    }

    async fn list_apps(&self) -> Result<String> {
        let names: Vec<String> = self
            .desktop_entries()
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        if names.is_empty() {
            return Ok("No applications found".to_string());
        }
        Ok(truncate_chars(&names.join("\n"), MAX_OUTPUT_CHARS))
    }

    async fn network_info(&self) -> Result<String> {
        let mut lines = Vec::new();
        let mut read_dir = tokio::fs::read_dir("/sys/class/net")
            .await
            .context("Failed to read network interfaces")?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let state = tokio::fs::read_to_string(entry.path().join("operstate"))
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            let kind = if entry.path().join("wireless").exists() {
                "Wi-Fi"
            } else {
                "Wired"
            };
            lines.push(format!("{} ({}): {}", name, kind, state.trim()));
        }
        lines.sort();

        if lines.is_empty() {
            return Ok("📶 Network Status:\nNo Active Network".to_string());
        }
        Ok(format!("📶 Network Status:\n{}", lines.join("\n")))
    }

    async fn memory_info(&self) -> Result<String> {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo")
            .await
            .context("Failed to read /proc/meminfo")?;
        let total = meminfo_value(&meminfo, "MemTotal").unwrap_or(0) / 1024;
        let avail = meminfo_value(&meminfo, "MemAvailable").unwrap_or(0) / 1024;
        let swap_total = meminfo_value(&meminfo, "SwapTotal").unwrap_or(0) / 1024;
        let swap_free = meminfo_value(&meminfo, "SwapFree").unwrap_or(0) / 1024;

        Ok(format!(
            "💾 Memory Info:\nRAM: {} MB / {} MB\nSwap: {} MB / {} MB",
            avail, total, swap_free, swap_total
        ))
    }

    async fn take_photo(&self, camera_id: &str) -> Result<MediaFile> {
        if !camera_id.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("Invalid camera id: {}", camera_id);
        }
        let path = scratch_file("snap", "jpg");
        let device = format!("/dev/video{}", camera_id);
        let path_arg = path.to_string_lossy().to_string();
        run_tool(
            "fswebcam",
            &["-q", "--no-banner", "-d", device.as_str(), path_arg.as_str()],
        )
        .await?;
        take_file(&path).await
    }

    async fn clipboard(&self) -> Result<String> {
        let text = match run_tool("wl-paste", &["--no-newline"]).await {
            Ok(text) => text,
            Err(_) => run_tool("xclip", &["-o", "-selection", "clipboard"]).await?,
        };
        if text.is_empty() {
            return Ok("Empty".to_string());
        }
        Ok(truncate_chars(&text, MAX_OUTPUT_CHARS))
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        let level = format!("{}%", percent.min(100));
        run_tool("amixer", &["-q", "sset", "Master", level.as_str()]).await?;
        Ok(())
    }

    async fn shell(&self, cmdline: &str) -> Result<String> {
        info!("Executing shell command: {}", cmdline);

        let run = tokio::time::timeout(
            self.shell_timeout,
            Command::new(&self.shell)
                .arg("-c")
                .arg(cmdline)
                .current_dir(&self.files_root)
                .kill_on_drop(true)
                .output(),
        )
        .await;
        let output = match run {
            Ok(output) => {
                output.with_context(|| format!("Failed to execute command: {}", cmdline))?
            }
            Err(_) => anyhow::bail!(
                "Command timed out after {}s and was killed: {}",
                self.shell_timeout.as_secs(),
                cmdline
            ),
        };

        let mut result = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            result.push_str(&stderr);
        }
        if result.trim().is_empty() {
            result = format!(
                "Command executed (no output, exit code {})",
                output.status.code().unwrap_or(-1)
            );
        }
        Ok(truncate_chars(&result, MAX_OUTPUT_CHARS))
    }

    async fn launch_app(&self, name: &str) -> Result<String> {
        let entries = self.desktop_entries().await?;
        let Some((label, id)) = entries
            .into_iter()
            .find(|(label, id)| label.eq_ignore_ascii_case(name) || id.eq_ignore_ascii_case(name))
        else {
            return Ok(format!("App '{}' not found", name));
        };

        match Command::new("gtk-launch").arg(&id).spawn() {
            Ok(_) => Ok(format!("Launched {}", label)),
            Err(e) => {
                warn!("gtk-launch failed for {}: {}", id, e);
                Ok(format!("Cannot launch {}", label))
            }
        }
    }

    async fn list_files(&self, path: &str) -> Result<String> {
        let full_path = validate_root_path(&self.files_root, path)?;
        info!("Listing files: {}", full_path.display());

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full_path)
            .await
            .with_context(|| format!("Invalid directory: {}", full_path.display()))?;

        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let prefix = if file_type.is_dir() { "📁" } else { "📄" };
            entries.push(format!("{} {}", prefix, entry.file_name().to_string_lossy()));
        }

        entries.sort();
        if entries.is_empty() {
            Ok("Empty directory".to_string())
        } else {
            Ok(truncate_chars(&entries.join("\n"), MAX_OUTPUT_CHARS))
        }
    }

    async fn read_file(&self, path: &str) -> Result<MediaFile> {
        let full_path = validate_root_path(&self.files_root, path)?;
        if !full_path.is_file() {
            anyhow::bail!("File not found: {}", path);
        }
        let bytes = tokio::fs::read(&full_path)
            .await
            .with_context(|| format!("Failed to read file: {}", full_path.display()))?;
        Ok(MediaFile {
            file_name: full_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "file".to_string()),
            bytes,
        })
    }

    async fn show_alert(&self, text: &str) -> Result<()> {
        run_tool("notify-send", &["-u", "critical", "🚨 ALERT", text]).await?;
        Ok(())
    }

    async fn speak(&self, text: &str) -> Result<()> {
        // espeak blocks until done; let it finish in the background
        Command::new("espeak")
            .arg(text)
            .spawn()
            .context("Failed to start espeak")?;
        Ok(())
    }
}
