//! Background job scheduler.
//!
//! When `CATSYNC_SYNC_CRON` is set, registers a recurring catalog sync at
//! server startup. A tick that lands while a job is still running is skipped
//! — the engine's single-flight registry refuses the second trigger.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use catsync_engine::{EngineError, JobError, SyncEngine, SyncOptions};

/// Builds and starts the scheduler when a cron expression is configured.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process — dropping it shuts down all jobs. Returns
/// `None` when scheduling is disabled.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    engine: Arc<SyncEngine>,
    config: Arc<catsync_core::AppConfig>,
) -> Result<Option<JobScheduler>, JobSchedulerError> {
    let Some(cron) = config.sync_cron.clone() else {
        tracing::info!("CATSYNC_SYNC_CRON not set; scheduled sync disabled");
        return Ok(None);
    };

    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let engine = Arc::clone(&engine);

        Box::pin(async move {
            tracing::info!("scheduler: triggering catalog sync");
            let options = SyncOptions {
                storefront: None,
                max_offers: None,
                trigger_source: "scheduler".to_owned(),
            };
            match engine.try_start(options) {
                Ok(()) => {}
                Err(EngineError::Job(JobError::AlreadyRunning)) => {
                    tracing::warn!("scheduler: a sync job is already running; skipping this tick");
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: failed to trigger catalog sync");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(cron = %cron, "scheduled catalog sync registered");
    Ok(Some(scheduler))
}
