//! Ephemeral progress snapshots published while a job runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Latest progress of a running job. A cache entry, never a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Job the snapshot belongs to.
    pub job_id: JobId,
    /// Attempt number the snapshot was written by (starts at 1).
    pub attempt: u32,
    /// Completion percentage, 0–100.
    pub percentage: u8,
    /// Human-readable current step.
    pub message: String,
    /// Optional machine-readable stage name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Items finished so far (batch jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    /// Items in total (batch jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// When the snapshot was written.
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Create a snapshot, clamping the percentage to 100.
    pub fn new(job_id: JobId, attempt: u32, percentage: u8, message: impl Into<String>) -> Self {
        Self {
            job_id,
            attempt,
            percentage: percentage.min(100),
            message: message.into(),
            stage: None,
            completed: None,
            total: None,
            updated_at: Utc::now(),
        }
    }

    /// Attach batch counters.
    pub fn with_counts(mut self, completed: u64, total: u64) -> Self {
        self.completed = Some(completed);
        self.total = Some(total);
        self
    }

    /// Attach a stage name.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Milliseconds since the snapshot was written.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_milliseconds().max(0)
    }
}
