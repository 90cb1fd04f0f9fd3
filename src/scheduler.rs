// src/scheduler.rs
//! Daily scrape trigger. Fires at the configured hour:minute (UTC) and goes
//! through the same run-state gate as the manual trigger; no catch-up for
//! missed runs.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::orchestrator::ScrapeOrchestrator;

/// Start the daily scrape schedule. The returned scheduler must be kept
/// alive for the jobs to fire.
pub async fn start_scheduler(
    orchestrator: Arc<ScrapeOrchestrator>,
    hour: u8,
    minute: u8,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let schedule = format!("0 {} {} * * *", minute, hour);
    let job_orchestrator = orchestrator.clone();
    let scrape_job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let orchestrator = job_orchestrator.clone();
        Box::pin(async move {
            info!("Scheduled scrape starting");
            if let Err(e) = orchestrator.try_start(None) {
                warn!("Skipping scheduled scrape: {}", e);
            }
        })
    })?;

    scheduler.add(scrape_job).await?;
    scheduler.start().await?;

    info!(
        "Scheduler started. Daily scrape at {:02}:{:02} UTC",
        hour, minute
    );
    Ok(scheduler)
}
