use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use super::Store;
use crate::model::{Credentials, DashboardState};

const KEY_BOT_TOKEN: &str = "bot_token";
const KEY_CHAT_ID: &str = "chat_id";
const KEY_LAST_UPDATE_ID: &str = "last_update_id";

/// Persistent settings: credentials, the update cursor and dashboard identity.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn credentials(&self) -> Result<Credentials>;
    async fn set_credentials(&self, credentials: &Credentials) -> Result<()>;

    async fn cursor(&self) -> Result<i64>;
    /// Never moves the stored cursor backwards.
    async fn set_cursor(&self, last_update_id: i64) -> Result<()>;

    /// State for one sub-channel; `message_id == 0` when none is live.
    async fn dashboard_state(&self, sub_channel: i32) -> Result<DashboardState>;
    async fn set_dashboard_state(&self, state: &DashboardState) -> Result<()>;
    async fn clear_dashboard_state(&self, sub_channel: i32) -> Result<()>;
}

fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        rusqlite::params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to read setting '{}'", key))
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )
    .with_context(|| format!("Failed to write setting '{}'", key))?;
    Ok(())
}

#[async_trait]
impl ConfigStore for Store {
    async fn credentials(&self) -> Result<Credentials> {
        let conn = self.conn.lock().await;
        Ok(Credentials {
            bot_token: read_setting(&conn, KEY_BOT_TOKEN)?.unwrap_or_default(),
            authorized_chat_id: read_setting(&conn, KEY_CHAT_ID)?.unwrap_or_default(),
        })
    }

    async fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        let conn = self.conn.lock().await;
        write_setting(&conn, KEY_BOT_TOKEN, credentials.bot_token.trim())?;
        write_setting(&conn, KEY_CHAT_ID, credentials.authorized_chat_id.trim())?;
        Ok(())
    }

    async fn cursor(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let raw = read_setting(&conn, KEY_LAST_UPDATE_ID)?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn set_cursor(&self, last_update_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        let current: i64 = read_setting(&conn, KEY_LAST_UPDATE_ID)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if last_update_id > current {
            write_setting(&conn, KEY_LAST_UPDATE_ID, &last_update_id.to_string())?;
        }
        Ok(())
    }

    async fn dashboard_state(&self, sub_channel: i32) -> Result<DashboardState> {
        let conn = self.conn.lock().await;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT message_id, page FROM dashboards WHERE sub_channel = ?1",
                rusqlite::params![sub_channel],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read dashboard state")?;

        Ok(match row {
            Some((message_id, page)) => DashboardState {
                sub_channel,
                message_id,
                page: u8::try_from(page).unwrap_or(1),
            },
            None => DashboardState::none(sub_channel),
        })
    }

    async fn set_dashboard_state(&self, state: &DashboardState) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO dashboards (sub_channel, message_id, page) VALUES (?1, ?2, ?3)
             ON CONFLICT(sub_channel) DO UPDATE SET
                message_id = excluded.message_id,
                page = excluded.page,
                updated_at = datetime('now')",
            rusqlite::params![state.sub_channel, state.message_id, state.page as i64],
        )
        .context("Failed to store dashboard state")?;
        Ok(())
    }

    async fn clear_dashboard_state(&self, sub_channel: i32) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM dashboards WHERE sub_channel = ?1",
            rusqlite::params![sub_channel],
        )
        .context("Failed to clear dashboard state")?;
        Ok(())
    }
}
