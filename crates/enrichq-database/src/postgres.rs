//! PostgreSQL job store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, warn};

use enrichq_core::error::{AppError, ErrorKind};
use enrichq_core::result::AppResult;
use enrichq_entity::job::{Job, JobId, JobStatus, JobUpdate};

use crate::store::{JobStore, status_names};

/// Job store backed by the `enrichment_jobs` table.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Create a new job store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
        move |e| AppError::with_source(ErrorKind::Database, message, e)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT INTO enrichment_jobs \
             (id, job_type, priority, payload, status, retry_count, max_retries, stalled_count, \
              run_at, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&job.id)
        .bind(job.job_type)
        .bind(job.priority)
        .bind(Json(&job.payload))
        .bind(job.status)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.stalled_count)
        .bind(job.run_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(job_id = %job.id, job_type = %job.job_type, "Inserted job");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::conflict(format!("Job '{}' already exists", job.id)),
            ),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Database,
                "Failed to create job",
                e,
            )),
        }
    }

    async fn update(&self, id: &JobId, update: &JobUpdate) -> AppResult<Job> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Self::db_err("Failed to begin job update"))?;

        let mut job =
            sqlx::query_as::<_, Job>("SELECT * FROM enrichment_jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::db_err("Failed to load job for update"))?
                .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))?;

        if let Err(e) = job.apply(update, Utc::now()) {
            warn!(job_id = %id, error = %e, "Rejected job update");
            return Err(e);
        }

        sqlx::query(
            "UPDATE enrichment_jobs SET status = $2, retry_count = $3, stalled_count = $4, \
             result = $5, error = $6, last_error = $7, run_at = $8, started_at = $9, \
             completed_at = $10, updated_at = $11, version = $12 \
             WHERE id = $1",
        )
        .bind(&job.id)
        .bind(job.status)
        .bind(job.retry_count)
        .bind(job.stalled_count)
        .bind(&job.result)
        .bind(&job.error)
        .bind(&job.last_error)
        .bind(job.run_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(job.version)
        .execute(&mut *tx)
        .await
        .map_err(Self::db_err("Failed to write job update"))?;

        tx.commit()
            .await
            .map_err(Self::db_err("Failed to commit job update"))?;

        Ok(job)
    }

    async fn get(&self, id: &JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM enrichment_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err("Failed to find job"))
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>> {
        sqlx::query_scalar::<_, JobId>(
            "DELETE FROM enrichment_jobs WHERE status::text = ANY($1) AND updated_at < $2 \
             RETURNING id",
        )
        .bind(status_names(statuses))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err("Failed to clean up jobs"))
    }

    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> AppResult<Vec<JobId>> {
        sqlx::query_scalar::<_, JobId>(
            "SELECT id FROM enrichment_jobs WHERE status::text = ANY($1) AND updated_at < $2",
        )
        .bind(status_names(statuses))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err("Failed to list old jobs"))
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM enrichment_jobs WHERE status::text = ANY($1) ORDER BY created_at ASC",
        )
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err("Failed to list jobs"))
    }

    async fn count_by_status(&self) -> AppResult<HashMap<JobStatus, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status::text, COUNT(*) FROM enrichment_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err("Failed to count jobs"))?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = status
                .parse::<JobStatus>()
                .map_err(|e| AppError::new(ErrorKind::Database, e))?;
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(Self::db_err("Health check failed"))
    }
}
