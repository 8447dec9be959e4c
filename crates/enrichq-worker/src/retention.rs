//! Retention cleanup shared by the queue service and the operator CLI.

use chrono::Utc;
use serde::Serialize;
use tracing;

use enrichq_cache::ProgressChannel;
use enrichq_core::result::AppResult;
use enrichq_database::JobStore;
use enrichq_entity::JobStatus;

/// Outcome of a retention cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_jobs: u64,
    pub deleted_progress: u64,
}

/// Delete terminal jobs last updated more than `older_than_days` ago and
/// clear the progress entries of exactly the jobs deleted.
///
/// Progress clearing is best-effort; a failure is logged and the job
/// deletion still counts.
pub async fn purge_expired(
    store: &dyn JobStore,
    progress: Option<&ProgressChannel>,
    older_than_days: u32,
) -> AppResult<CleanupReport> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
    let deleted = store.delete_older_than(cutoff, &JobStatus::TERMINAL).await?;

    let mut report = CleanupReport {
        deleted_jobs: deleted.len() as u64,
        deleted_progress: 0,
    };

    if let Some(channel) = progress {
        for job_id in &deleted {
            match channel.clear(job_id).await {
                Ok(true) => report.deleted_progress += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to clear progress");
                }
            }
        }
    }

    tracing::info!(
        older_than_days,
        deleted_jobs = report.deleted_jobs,
        deleted_progress = report.deleted_progress,
        "Cleanup finished"
    );
    Ok(report)
}
