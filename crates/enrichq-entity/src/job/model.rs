//! Job entity model.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::payload::{JobPayload, JobType};
use super::status::{JobStatus, Priority};

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Caller-visible job identifier: `{type}_{unix_millis}_{random}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh id without coordination.
    pub fn generate(job_type: JobType, now: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!(
            "{}_{}_{}",
            job_type.as_str(),
            now.timestamp_millis(),
            suffix
        ))
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A durable enrichment job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Job type (mirrors the payload tag).
    pub job_type: JobType,
    /// Routing priority.
    pub priority: Priority,
    /// Type-specific input.
    #[sqlx(json)]
    pub payload: JobPayload,
    /// Current status.
    pub status: JobStatus,
    /// Backoff retries consumed so far.
    pub retry_count: i32,
    /// Backoff retry budget.
    pub max_retries: i32,
    /// Stalls detected during the current attempt.
    pub stalled_count: i32,
    /// Result on completion.
    pub result: Option<serde_json::Value>,
    /// Error message while failed.
    pub error: Option<String>,
    /// Most recent error, kept after the job leaves `failed`.
    pub last_error: Option<String>,
    /// Earliest time the job may be claimed (enqueue delay or backoff).
    pub run_at: Option<DateTime<Utc>>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every accepted update.
    pub version: i64,
}

impl Job {
    /// Build a pending job from creation parameters.
    pub fn from_new(new: NewJob, now: DateTime<Utc>) -> Self {
        let job_type = new.payload.job_type();
        let id = new.id.unwrap_or_else(|| JobId::generate(job_type, now));
        Self {
            id,
            job_type,
            priority: new.priority,
            payload: new.payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: new.max_retries,
            stalled_count: 0,
            result: None,
            error: None,
            last_error: None,
            run_at: new.run_at,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Check if the job may run another backoff attempt.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Check if an operator retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.has_retries_left()
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Explicit id; generated when `None`.
    pub id: Option<JobId>,
    /// Typed payload.
    pub payload: JobPayload,
    /// Routing priority.
    pub priority: Priority,
    /// Backoff retry budget.
    pub max_retries: i32,
    /// Deferred visibility.
    pub run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateProfile;
    use crate::job::payload::TargetedEnhancementPayload;

    fn payload() -> JobPayload {
        JobPayload::ExperienceEnhancement(TargetedEnhancementPayload {
            candidate_id: None,
            candidate: CandidateProfile::default(),
            job_description: "Platform engineer".into(),
            client_name: None,
            context: Default::default(),
        })
    }

    #[test]
    fn test_generated_id_format() {
        let now = Utc::now();
        let id = JobId::generate(JobType::BulkEnrichment, now);
        let parts: Vec<&str> = id.as_str().rsplitn(3, '_').collect();
        assert_eq!(parts[0].len(), 9);
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2], "bulk_enrichment");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let now = Utc::now();
        let a = JobId::generate(JobType::DocumentGeneration, now);
        let b = JobId::generate(JobType::DocumentGeneration, now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_new_starts_pending() {
        let now = Utc::now();
        let job = Job::from_new(
            NewJob {
                id: None,
                payload: payload(),
                priority: Priority::HIGH,
                max_retries: 5,
                run_at: None,
            },
            now,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::ExperienceEnhancement);
        assert!(job.id.as_str().starts_with("experience_enhancement_"));
        assert_eq!(job.created_at, now);
        assert!(job.has_retries_left());
        assert!(!job.can_retry());
    }
}
