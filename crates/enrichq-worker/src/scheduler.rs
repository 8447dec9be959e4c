//! Cron scheduler for periodic maintenance.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use enrichq_core::error::AppError;

use crate::service::QueueService;

/// Runs retention cleanup against a [`QueueService`] on a cron schedule.
pub struct CronScheduler {
    scheduler: JobScheduler,
    service: Arc<QueueService>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a scheduler with no tasks registered.
    pub async fn new(service: Arc<QueueService>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler, service })
    }

    /// Register the retention cleanup on `cron`, deleting terminal jobs
    /// older than `retention_days`.
    pub async fn register_cleanup(&self, cron: &str, retention_days: u32) -> Result<(), AppError> {
        let service = Arc::clone(&self.service);
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let service = Arc::clone(&service);
            Box::pin(async move {
                tracing::debug!(retention_days, "Running scheduled cleanup");
                if let Err(e) = service.cleanup(retention_days).await {
                    tracing::error!(error = %e, "Scheduled cleanup failed");
                }
            })
        })
        .map_err(|e| AppError::configuration(format!("Invalid cleanup schedule '{cron}': {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add cleanup schedule: {e}")))?;

        tracing::info!(cron, retention_days, "Registered: cleanup");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shut the scheduler down.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use enrichq_cache::{CacheManager, ProgressChannel};
    use enrichq_core::config::cache::CacheConfig;
    use enrichq_database::MemoryJobStore;
    use std::time::Duration;

    use crate::executor::JobExecutor;
    use crate::settings::QueueSettings;

    async fn service() -> Arc<QueueService> {
        let cache = CacheManager::new(&CacheConfig::default()).await.unwrap();
        let progress = ProgressChannel::new(cache.provider(), Duration::from_secs(60));
        Arc::new(QueueService::new(
            Arc::new(MemoryJobStore::new()),
            progress,
            JobExecutor::new(),
            QueueSettings::default(),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_is_rejected() {
        let scheduler = CronScheduler::new(service().await).await.unwrap();
        let err = scheduler.register_cleanup("not a cron", 7).await.unwrap_err();
        assert!(err.to_string().contains("Invalid cleanup schedule"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_default_schedule() {
        let scheduler = CronScheduler::new(service().await).await.unwrap();
        scheduler.register_cleanup("0 0 3 * * *", 7).await.unwrap();
    }
}
