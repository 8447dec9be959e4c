//! The progress channel: ephemeral, TTL'd progress snapshots per job.
//!
//! Frequent progress writes land here instead of the durable job store.
//! Entries expire on their own, so a crash without cleanup never leaks
//! state for longer than the configured TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use enrichq_core::result::AppResult;
use enrichq_core::traits::cache::CacheProvider;
use enrichq_entity::{JobId, ProgressRecord};

use crate::keys;

/// Publishes and reads the latest [`ProgressRecord`] per job.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    cache: Arc<dyn CacheProvider>,
    ttl: Duration,
}

impl ProgressChannel {
    /// Build a channel over a cache provider.
    pub fn new(cache: Arc<dyn CacheProvider>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Overwrite the latest snapshot for a job and restart its TTL.
    pub async fn publish(&self, record: &ProgressRecord) -> AppResult<()> {
        let json = serde_json::to_string(record)?;
        self.cache
            .set(&keys::job_progress(&record.job_id), &json, self.ttl)
            .await?;
        debug!(
            job_id = %record.job_id,
            percentage = record.percentage,
            "Published progress"
        );
        Ok(())
    }

    /// Latest snapshot, if one exists and has not expired.
    ///
    /// An unreadable entry is dropped and reported as absent.
    pub async fn latest(&self, job_id: &JobId) -> AppResult<Option<ProgressRecord>> {
        let key = keys::job_progress(job_id);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Discarding unreadable progress entry");
                self.cache.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Remove the snapshot for a job. Returns whether one existed.
    pub async fn clear(&self, job_id: &JobId) -> AppResult<bool> {
        self.cache.delete(&keys::job_progress(job_id)).await
    }
}
