//! Cache key builders for every enrichq cache entry.

use enrichq_entity::JobId;

const PROGRESS: &str = "progress";

/// Cache key for the latest progress snapshot of a job.
pub fn job_progress(job_id: &JobId) -> String {
    format!("{PROGRESS}:{job_id}")
}
