//! Background job scheduling

pub mod remove_old_media;

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

pub use remove_old_media::{JobStatus, RemoveOldMedia, SweepSummary};

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    remove_old_media: Arc<RemoveOldMedia>,
    schedule: &str,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = remove_old_media.clone();
    let removal_job = Job::new_async(schedule, move |_uuid, _l| {
        let job = job.clone();
        Box::pin(async move {
            info!("Running remove old media job");
            if let Err(e) = job.run().await {
                tracing::error!("Remove old media error: {:#}", e);
            }
        })
    })
    .with_context(|| format!("Invalid remove old media schedule '{}'", schedule))?;
    scheduler.add(removal_job).await?;

    scheduler.start().await?;

    info!(schedule = %schedule, "Job scheduler started");
    Ok(scheduler)
}
