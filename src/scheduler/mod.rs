pub mod tasks;

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Periodic driver for background jobs such as the event sync.
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Register `task` under a six-field cron expression (seconds first).
    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                debug!("Running job '{}'", name);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression '{}' for job '{}'", cron_expr, name))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job '{}'", name))?;

        info!("Job '{}' scheduled with cron: {}", name, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shut down scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
