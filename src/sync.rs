use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::model::{Event, TextFormat};
use crate::storage::{ConfigStore, EventStore};
use crate::transport::{ChatTransport, OutgoingText};

/// Longest summary line kept in a batch message, in chars.
const MAX_LINE_CHARS: usize = 380;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    /// Nothing was lost; call again later.
    Retry,
}

/// Flushes buffered events to the authorized chat in FIFO batches. Events are
/// only deleted once the message carrying them was accepted.
pub struct SyncPipeline {
    transport: Arc<dyn ChatTransport>,
    settings: Arc<dyn ConfigStore>,
    events: Arc<dyn EventStore>,
    batch_size: usize,
}

impl SyncPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        settings: Arc<dyn ConfigStore>,
        events: Arc<dyn EventStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            transport,
            settings,
            events,
            batch_size,
        }
    }

    pub async fn tick(&self) -> SyncOutcome {
        let credentials = match self.settings.credentials().await {
            Ok(c) => c,
            Err(e) => {
                error!("Sync could not read credentials: {:#}", e);
                return SyncOutcome::Retry;
            }
        };
        if !credentials.is_complete() {
            debug!("Sync skipped, credentials incomplete");
            return SyncOutcome::Retry;
        }

        let batch = match self.events.oldest(self.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!("Sync could not read events: {:#}", e);
                return SyncOutcome::Retry;
            }
        };
        if batch.is_empty() {
            return SyncOutcome::Success;
        }

        let message = OutgoingText {
            chat_id: credentials.authorized_chat_id.trim().to_string(),
            text: batch_body(&batch),
            sub_channel: None,
            keyboard: None,
            format: TextFormat::Plain,
        };
        if let Err(e) = self.transport.send(&message).await {
            warn!("Sync of {} events failed: {:#}", batch.len(), e);
            return SyncOutcome::Retry;
        }

        // a failed delete only means the batch is sent again next time
        if let Err(e) = self.events.delete(&batch).await {
            error!("Failed to delete {} synced events: {:#}", batch.len(), e);
        }
        info!("Synced {} events", batch.len());
        SyncOutcome::Success
    }

    /// Tick until the buffer is empty, a tick asks for a retry, a batch
    /// fails to leave the buffer, or `max_batches` batches went out.
    pub async fn drain(&self, max_batches: usize) -> SyncOutcome {
        let Some(mut remaining) = self.remaining().await else {
            return SyncOutcome::Retry;
        };
        for _ in 0..max_batches {
            if remaining == 0 {
                break;
            }
            if self.tick().await == SyncOutcome::Retry {
                return SyncOutcome::Retry;
            }
            let Some(now) = self.remaining().await else {
                return SyncOutcome::Retry;
            };
            // the same batch would only go out again
            if now >= remaining {
                warn!("Sync made no progress ({} events buffered), stopping", now);
                break;
            }
            remaining = now;
        }
        SyncOutcome::Success
    }

    async fn remaining(&self) -> Option<usize> {
        match self.events.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                error!("Sync could not count events: {:#}", e);
                None
            }
        }
    }
}

fn batch_body(batch: &[Event]) -> String {
    batch
        .iter()
        .map(|event| {
            let line = event.summary_line();
            if line.chars().count() > MAX_LINE_CHARS {
                let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
                format!("{}…", cut)
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
