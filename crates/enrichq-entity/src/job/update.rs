//! Partial job updates and the merge rules the durable store enforces.

use chrono::{DateTime, Utc};
use serde_json::Value;

use enrichq_core::error::AppError;
use enrichq_core::result::AppResult;

use super::model::Job;
use super::status::JobStatus;

/// A set of fields to merge into a stored job.
///
/// Unset fields are left untouched. `run_at` uses a nested option so an
/// update can clear it (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    /// New status; validated against the state machine.
    pub status: Option<JobStatus>,
    /// Result payload; only accepted with `completed`.
    pub result: Option<Value>,
    /// Error message; only accepted with `failed`.
    pub error: Option<String>,
    /// New retry count; may not exceed the budget.
    pub retry_count: Option<i32>,
    /// New stall count.
    pub stalled_count: Option<i32>,
    /// New earliest-claim time.
    pub run_at: Option<Option<DateTime<Utc>>>,
    /// First-start timestamp (write-once).
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp (write-once).
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// `pending → in_progress`, stamping the start time.
    pub fn in_progress(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::InProgress),
            stalled_count: Some(0),
            started_at: Some(now),
            ..Default::default()
        }
    }

    /// `in_progress → completed` with a result.
    pub fn completed(result: Value, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            completed_at: Some(now),
            ..Default::default()
        }
    }

    /// `in_progress → failed` with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// `failed → retry_scheduled`, consuming one retry.
    pub fn retry_scheduled(retry_count: i32, run_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::RetryScheduled),
            retry_count: Some(retry_count),
            run_at: Some(Some(run_at)),
            ..Default::default()
        }
    }

    /// `retry_scheduled → pending`.
    pub fn pending() -> Self {
        Self {
            status: Some(JobStatus::Pending),
            ..Default::default()
        }
    }

    /// Any live state `→ cancelled`.
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        }
    }

    /// Record a stall without changing status.
    pub fn stalled(count: i32) -> Self {
        Self {
            stalled_count: Some(count),
            ..Default::default()
        }
    }
}

impl Job {
    /// Merge an update into this record.
    ///
    /// Rejects illegal transitions and budget overruns with a conflict
    /// error, leaving the record untouched. On success `updated_at` is
    /// stamped and `version` bumped.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(AppError::conflict(format!(
                    "Job '{}' cannot move from {} to {}",
                    self.id, self.status, next
                )));
            }
        }

        let target = update.status.unwrap_or(self.status);

        if update.result.is_some() && target != JobStatus::Completed {
            return Err(AppError::validation(format!(
                "Job '{}' result is only accepted on completion",
                self.id
            )));
        }
        if update.error.is_some() && target != JobStatus::Failed {
            return Err(AppError::validation(format!(
                "Job '{}' error is only accepted on failure",
                self.id
            )));
        }
        if target == JobStatus::Completed && update.status.is_some() && update.result.is_none() {
            return Err(AppError::validation(format!(
                "Job '{}' cannot complete without a result",
                self.id
            )));
        }
        if target == JobStatus::Failed && update.status.is_some() && update.error.is_none() {
            return Err(AppError::validation(format!(
                "Job '{}' cannot fail without an error",
                self.id
            )));
        }
        if let Some(retry_count) = update.retry_count {
            if retry_count > self.max_retries || retry_count < self.retry_count {
                return Err(AppError::conflict(format!(
                    "Job '{}' retry count {} outside budget {}..={}",
                    self.id, retry_count, self.retry_count, self.max_retries
                )));
            }
        }

        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(stalled_count) = update.stalled_count {
            self.stalled_count = stalled_count;
        }
        if let Some(run_at) = update.run_at {
            self.run_at = run_at;
        }
        if self.started_at.is_none() {
            self.started_at = update.started_at;
        }
        if self.completed_at.is_none() {
            self.completed_at = update.completed_at;
        }

        if let Some(next) = update.status {
            self.status = next;
            if next == JobStatus::Failed {
                self.error = update.error.clone();
                self.last_error = update.error.clone();
            } else if let Some(previous) = self.error.take() {
                self.last_error = Some(previous);
            }
            if next == JobStatus::Completed {
                self.result = update.result.clone();
            } else {
                self.result = None;
            }
        }

        self.updated_at = now;
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateProfile;
    use crate::job::model::NewJob;
    use crate::job::payload::{JobPayload, TargetedEnhancementPayload};
    use crate::job::status::Priority;
    use chrono::Duration;

    fn job() -> Job {
        Job::from_new(
            NewJob {
                id: Some("skills_1_abc".into()),
                payload: JobPayload::SkillsOptimization(TargetedEnhancementPayload {
                    candidate_id: None,
                    candidate: CandidateProfile::default(),
                    job_description: "Data engineer".into(),
                    client_name: None,
                    context: Default::default(),
                }),
                priority: Priority::NORMAL,
                max_retries: 1,
                run_at: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_complete_sets_result_and_timestamps() {
        let mut job = job();
        let t1 = job.created_at + Duration::milliseconds(5);
        let t2 = t1 + Duration::milliseconds(5);
        job.apply(&JobUpdate::in_progress(t1), t1).unwrap();
        job.apply(&JobUpdate::completed(serde_json::json!({"ok": true}), t2), t2)
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(serde_json::json!({"ok": true})));
        assert!(job.error.is_none());
        assert_eq!(job.started_at, Some(t1));
        assert_eq!(job.completed_at, Some(t2));
        assert_eq!(job.version, 2);
    }

    #[test]
    fn test_started_at_is_write_once() {
        let mut job = job();
        let first = job.created_at + Duration::seconds(1);
        job.apply(&JobUpdate::in_progress(first), first).unwrap();
        job.apply(&JobUpdate::failed("boom"), first).unwrap();
        job.apply(&JobUpdate::retry_scheduled(1, first), first).unwrap();
        job.apply(&JobUpdate::pending(), first).unwrap();
        let second = first + Duration::seconds(10);
        job.apply(&JobUpdate::in_progress(second), second).unwrap();
        assert_eq!(job.started_at, Some(first));
    }

    #[test]
    fn test_error_cleared_when_leaving_failed() {
        let mut job = job();
        let now = Utc::now();
        job.apply(&JobUpdate::in_progress(now), now).unwrap();
        job.apply(&JobUpdate::failed("timeout"), now).unwrap();
        assert_eq!(job.error.as_deref(), Some("timeout"));

        job.apply(&JobUpdate::retry_scheduled(1, now), now).unwrap();
        assert!(job.error.is_none());
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_cancelled_wins_over_late_completion() {
        let mut job = job();
        let now = Utc::now();
        job.apply(&JobUpdate::in_progress(now), now).unwrap();
        job.apply(&JobUpdate::cancelled(), now).unwrap();

        let err = job
            .apply(&JobUpdate::completed(serde_json::json!({}), now), now)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
    }

    #[test]
    fn test_retry_budget_cannot_be_exceeded() {
        let mut job = job();
        let now = Utc::now();
        job.apply(&JobUpdate::in_progress(now), now).unwrap();
        job.apply(&JobUpdate::failed("x"), now).unwrap();
        let err = job
            .apply(&JobUpdate::retry_scheduled(2, now), now)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_result_without_completion_rejected() {
        let mut job = job();
        let update = JobUpdate {
            result: Some(serde_json::json!(1)),
            ..Default::default()
        };
        assert!(job.apply(&update, Utc::now()).is_err());
        assert_eq!(job.version, 0);
    }
}
