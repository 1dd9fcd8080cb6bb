use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::scheduler::Scheduler;
use crate::sync::{SyncOutcome, SyncPipeline};

/// Upper bound on batches flushed by one scheduled run.
const MAX_BATCHES_PER_RUN: usize = 20;

/// Register the periodic event sync. A run that is still in progress when
/// the next one fires makes the newer run a no-op.
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    sync: Arc<SyncPipeline>,
    cron_expr: &str,
) -> anyhow::Result<()> {
    let running = Arc::new(Mutex::new(()));

    scheduler
        .add_cron_job(cron_expr, "event-sync", move || {
            let sync = sync.clone();
            let running = running.clone();
            Box::pin(async move {
                let Ok(_guard) = running.try_lock() else {
                    debug!("Previous event sync still running, skipping");
                    return;
                };
                match sync.drain(MAX_BATCHES_PER_RUN).await {
                    SyncOutcome::Success => debug!("Event sync complete"),
                    SyncOutcome::Retry => info!("Event sync deferred until the next run"),
                }
            })
        })
        .await?;

    Ok(())
}
