use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::model::{Command, Update};
use crate::router::CommandRouter;
use crate::storage::ConfigStore;
use crate::transport::ChatTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of updates consumed, authorized or not.
    Processed(usize),
    Idle,
    Failed,
}

/// Long-poll consumer. Owns the update cursor: every update advances it and
/// the new value is persisted before the next update is looked at. The
/// in-memory copy keeps advancing when persisting fails, so a store error
/// never makes Telegram redeliver handled updates.
pub struct UpdateLoop {
    transport: Arc<dyn ChatTransport>,
    settings: Arc<dyn ConfigStore>,
    router: Arc<CommandRouter>,
    poll_timeout_secs: u64,
    idle_delay: Duration,
    next_offset: AtomicI64,
}

impl UpdateLoop {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        settings: Arc<dyn ConfigStore>,
        router: Arc<CommandRouter>,
        config: &TelegramConfig,
    ) -> Self {
        Self {
            transport,
            settings,
            router,
            poll_timeout_secs: config.poll_timeout(),
            idle_delay: Duration::from_secs(config.idle_delay_secs),
            next_offset: AtomicI64::new(0),
        }
    }

    /// Runs until `stop` flips to `true` or its sender is dropped. The
    /// long-poll itself is abandoned on stop; an update being routed is not.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!("Update loop started");

        loop {
            if *stop.borrow() {
                break;
            }

            let fetched = tokio::select! {
                fetched = self.fetch() => fetched,
                _ = stop.changed() => break,
            };

            let outcome = match fetched {
                Ok(updates) => self.process(updates).await,
                Err(e) => {
                    warn!("Fetching updates failed: {:#}", e);
                    PollOutcome::Failed
                }
            };

            if let PollOutcome::Processed(_) = outcome {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.idle_delay) => {}
                _ = stop.changed() => break,
            }
        }

        info!("Update loop stopped");
    }

    async fn fetch(&self) -> Result<Vec<Update>> {
        let stored = match self.settings.cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("Failed to read cursor: {:#}", e);
                0
            }
        };
        let offset = self.next_offset.fetch_max(stored, Ordering::SeqCst).max(stored);
        self.transport
            .fetch_updates(offset, self.poll_timeout_secs)
            .await
    }

    async fn process(&self, updates: Vec<Update>) -> PollOutcome {
        if updates.is_empty() {
            return PollOutcome::Idle;
        }

        let count = updates.len();
        for update in updates {
            let next = update.update_id + 1;
            self.handle(update).await;
            self.next_offset.fetch_max(next, Ordering::SeqCst);
            if let Err(e) = self.settings.set_cursor(next).await {
                error!("Failed to persist cursor {}: {:#}", next, e);
            }
        }
        PollOutcome::Processed(count)
    }

    async fn handle(&self, update: Update) {
        let credentials = match self.settings.credentials().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read credentials, dropping update: {:#}", e);
                return;
            }
        };

        let Some(chat_id) = update.chat_id.as_deref() else {
            debug!("Update {} has no chat, dropped", update.update_id);
            return;
        };
        if !credentials.authorizes(chat_id) {
            warn!(
                "Update {} from unauthorized chat {} dropped",
                update.update_id, chat_id
            );
            return;
        }
        if credentials.authorized_chat_id.trim().is_empty() {
            info!(
                "Update from chat {} accepted; set authorized_chat_id to lock the bot to it",
                chat_id
            );
        }

        match Command::from_update(&update) {
            Some(cmd) => self.router.route(cmd).await,
            None => {
                debug!("Update {} carries no command", update.update_id);
                // a button without data still needs its spinner cleared
                if let Some(id) = &update.callback_query_id {
                    if let Err(e) = self.transport.ack_callback(id).await {
                        debug!("Callback ack failed: {:#}", e);
                    }
                }
            }
        }
    }
}
