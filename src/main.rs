mod capabilities;
mod config;
mod dashboard;
mod model;
mod outbox;
mod router;
mod scheduler;
mod storage;
mod sync;
#[cfg(test)]
mod testing;
mod transport;
mod update_loop;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::capabilities::host::HostCapabilities;
use crate::capabilities::CapabilityProvider;
use crate::config::{Config, TelegramConfig};
use crate::dashboard::DashboardEngine;
use crate::model::{Button, Keyboard};
use crate::outbox::Outbox;
use crate::router::CommandRouter;
use crate::scheduler::tasks::register_builtin_tasks;
use crate::scheduler::Scheduler;
use crate::storage::{ConfigStore, EventStore, Store};
use crate::sync::SyncPipeline;
use crate::transport::telegram::TelegramTransport;
use crate::transport::ChatTransport;
use crate::update_loop::UpdateLoop;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commander=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)?;
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Files root: {}", config.device.files_root.display());
    info!("  Sync cron: {}", config.sync.cron);

    let store = Arc::new(Store::open(&config.storage.database_path)?);
    seed_credentials(store.as_ref(), &config.telegram).await?;

    let settings: Arc<dyn ConfigStore> = store.clone();
    let events: Arc<dyn EventStore> = store;
    let transport: Arc<dyn ChatTransport> =
        Arc::new(TelegramTransport::new(&config.telegram, settings.clone())?);
    let capabilities: Arc<dyn CapabilityProvider> =
        Arc::new(HostCapabilities::new(&config.device));

    let outbox = Arc::new(Outbox::new(transport.clone(), settings.clone()));
    let dashboard = Arc::new(DashboardEngine::new(
        outbox.clone(),
        settings.clone(),
        capabilities.clone(),
    ));
    let router = Arc::new(CommandRouter::new(
        outbox.clone(),
        dashboard,
        capabilities,
        events.clone(),
        config.device.default_record_secs,
    ));
    let update_loop = UpdateLoop::new(
        transport.clone(),
        settings.clone(),
        router,
        &config.telegram,
    );
    let sync = Arc::new(SyncPipeline::new(
        transport,
        settings,
        events,
        config.sync.batch_size,
    ));

    let mut scheduler = Scheduler::new().await?;
    register_builtin_tasks(&scheduler, sync, &config.sync.cron).await?;
    scheduler.start().await?;

    if config.device.announce_online {
        announce_online(&outbox).await;
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let poller = tokio::spawn(async move { update_loop.run(stop_rx).await });

    info!("Commander is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down...");
    let _ = stop_tx.send(true);
    if let Err(e) = poller.await {
        error!("Update loop task failed: {}", e);
    }
    scheduler.shutdown().await?;

    Ok(())
}

/// Values from the config file win over stored ones; blank values leave the
/// stored credentials alone so they can be set once and dropped from the file.
async fn seed_credentials(store: &Store, telegram: &TelegramConfig) -> Result<()> {
    let mut credentials = store.credentials().await?;
    if !telegram.bot_token.trim().is_empty() {
        credentials.bot_token = telegram.bot_token.clone();
    }
    if !telegram.authorized_chat_id.trim().is_empty() {
        credentials.authorized_chat_id = telegram.authorized_chat_id.clone();
    }
    store.set_credentials(&credentials).await?;

    if credentials.bot_token.trim().is_empty() {
        warn!("No bot token configured; polling will fail until one is set");
    } else if credentials.authorized_chat_id.trim().is_empty() {
        warn!("No authorized chat configured; replies are disabled and inbound chat ids are logged");
    }
    Ok(())
}

async fn announce_online(outbox: &Outbox) {
    let keyboard = Keyboard {
        rows: vec![vec![Button::new("🖥 Open Dashboard", "menu")]],
    };
    let text = "🚀 *Commander Online*\nDevice is ready for commands.";
    if outbox.send_panel(None, text, keyboard).await.is_none() {
        warn!("Startup announcement was not delivered");
    }
}
