//! Durable job store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use enrichq_core::result::AppResult;
use enrichq_entity::job::{Job, JobId, JobStatus, JobUpdate};

/// Persists one record per job.
///
/// [`JobStore::update`] is the only mutation path. Implementations merge
/// the update into the current record atomically using [`Job::apply`],
/// so a stale writer (e.g. a stalled worker finishing after a cancel) is
/// rejected with a conflict instead of overwriting newer state.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new pending record. Fails with a conflict error if the id exists.
    async fn create(&self, job: &Job) -> AppResult<()>;

    /// Merge `update` into the record and return the new snapshot.
    ///
    /// Fails with a not-found error for unknown ids and a conflict error
    /// for transitions the state machine forbids.
    async fn update(&self, id: &JobId, update: &JobUpdate) -> AppResult<Job>;

    /// Return the current snapshot.
    async fn get(&self, id: &JobId) -> AppResult<Option<Job>>;

    /// Delete records in `statuses` last updated before `cutoff` and
    /// return the ids actually deleted.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>>;

    /// List ids that [`JobStore::delete_older_than`] would delete.
    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>>;

    /// List records in any of `statuses`, oldest first.
    async fn list_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<Job>>;

    /// Count records per status. Statuses with no records may be absent.
    async fn count_by_status(&self) -> AppResult<HashMap<JobStatus, u64>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Render statuses for `status::text = ANY($n)` binds.
pub(crate) fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}
