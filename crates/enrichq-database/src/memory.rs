//! In-memory job store backed by a concurrent map.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use enrichq_core::error::AppError;
use enrichq_core::result::AppResult;
use enrichq_entity::job::{Job, JobId, JobStatus, JobUpdate};

use crate::store::JobStore;

/// Job store that lives for the lifetime of the process.
///
/// Each update runs under the map's per-entry lock, so merges on the
/// same id are serialized.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Job '{}' already exists",
                job.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, id: &JobId, update: &JobUpdate) -> AppResult<Job> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))?;
        entry.apply(update, Utc::now())?;
        Ok(entry.clone())
    }

    async fn get(&self, id: &JobId) -> AppResult<Option<Job>> {
        Ok(self.jobs.get(id).map(|job| job.clone()))
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>> {
        let mut deleted = Vec::new();
        self.jobs.retain(|id, job| {
            let expired = statuses.contains(&job.status) && job.updated_at < cutoff;
            if expired {
                deleted.push(id.clone());
            }
            !expired
        });
        debug!(deleted = deleted.len(), %cutoff, "Deleted old jobs from memory store");
        Ok(deleted)
    }

    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>> {
        Ok(self
            .jobs
            .iter()
            .filter(|job| statuses.contains(&job.status) && job.updated_at < cutoff)
            .map(|job| job.id.clone())
            .collect())
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|job| statuses.contains(&job.status))
            .map(|job| job.clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn count_by_status(&self) -> AppResult<HashMap<JobStatus, u64>> {
        let mut counts = HashMap::new();
        for job in self.jobs.iter() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
