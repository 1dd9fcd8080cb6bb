use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Store;
use crate::model::Event;

/// Append-only buffer of events awaiting upload.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event_type: &str, payload: &str) -> Result<Event>;
    /// Up to `limit` events, oldest first.
    async fn oldest(&self, limit: usize) -> Result<Vec<Event>>;
    /// Deletes exactly the given events (by id).
    async fn delete(&self, events: &[Event]) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl EventStore for Store {
    async fn append(&self, event_type: &str, payload: &str) -> Result<Event> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (event_type, payload, timestamp) VALUES (?1, ?2, ?3)",
            rusqlite::params![event_type, payload, timestamp],
        )
        .context("Failed to append event")?;

        Ok(Event {
            id: conn.last_insert_rowid(),
            event_type: event_type.to_string(),
            payload: payload.to_string(),
            timestamp,
        })
    }

    async fn oldest(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, event_type, payload, timestamp
                 FROM events
                 ORDER BY timestamp ASC, id ASC
                 LIMIT ?1",
            )
            .context("Failed to prepare oldest-events query")?;

        let events = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    payload: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .context("Failed to query events")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect events")?;
        Ok(events)
    }

    async fn delete(&self, events: &[Event]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin delete")?;
        for event in events {
            tx.execute(
                "DELETE FROM events WHERE id = ?1",
                rusqlite::params![event.id],
            )
            .context("Failed to delete event")?;
        }
        tx.commit().context("Failed to commit delete")?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .context("Failed to count events")?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM events", [])
            .context("Failed to clear events")?;
        Ok(())
    }
}
