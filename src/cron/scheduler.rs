//! Cron scheduler for the periodic scan trigger.

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::worker::ScanScheduler;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    scheduler: Arc<ScanScheduler>,
    settings: CronSettings,
}

impl CronScheduler {
    pub fn new(scheduler: Arc<ScanScheduler>, settings: CronSettings) -> Self {
        Self {
            scheduler,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_scan_chain_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started");

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_scan_chain_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let scan_scheduler = self.scheduler.clone();
        let interval = self.settings.scan_interval_secs;

        let job = Job::new_repeated_async(
            std::time::Duration::from_secs(interval),
            move |_uuid, _lock| {
                let scan_scheduler = scan_scheduler.clone();
                Box::pin(async move {
                    if let Err(e) = jobs::scan_chain::run(&scan_scheduler).await {
                        error!("Failed to scan chain: {:#}", e);
                    }
                })
            },
        )?;

        scheduler.add(job).await?;
        info!("Registered scan_chain job (every {}s)", interval);
        Ok(())
    }
}
