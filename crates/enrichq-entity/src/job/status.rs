//! Job status state machine and priority values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an enrichment job.
///
/// ```text
/// pending ──► in_progress ──► completed
///    │             │
///    │             └────────► failed ──► retry_scheduled ──► pending
///    │             │                           │
///    └─────────────┴──────► cancelled ◄────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in a lane for a worker.
    Pending,
    /// Claimed by a worker; the handler is running.
    InProgress,
    /// The handler returned a result.
    Completed,
    /// The last attempt failed.
    Failed,
    /// Explicitly cancelled by an operator or caller.
    Cancelled,
    /// Failed, waiting out its backoff delay before the next attempt.
    RetryScheduled,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 6] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::RetryScheduled,
    ];

    /// Statuses eligible for retention cleanup.
    pub const TERMINAL: [JobStatus; 3] = [Self::Completed, Self::Failed, Self::Cancelled];

    /// Check whether an explicit cancel applies to this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::RetryScheduled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, InProgress) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            (Failed, RetryScheduled) => true,
            (RetryScheduled, Pending) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RetryScheduled => "retry_scheduled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{s}'"))
    }
}

/// Integer job severity. Higher values are more urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Least urgent named priority.
    pub const LOW: Priority = Priority(1);
    /// Default priority.
    pub const NORMAL: Priority = Priority(5);
    /// Elevated priority.
    pub const HIGH: Priority = Priority(10);
    /// Most urgent named priority.
    pub const CRITICAL: Priority = Priority(20);

    /// Whether this priority earns the elevated retry budget.
    pub fn is_elevated(&self) -> bool {
        *self >= Self::HIGH
    }

    /// Return the raw value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::RetryScheduled));
        assert!(JobStatus::RetryScheduled.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for next in JobStatus::ALL {
            assert!(!JobStatus::Completed.can_transition_to(next));
            assert!(!JobStatus::Cancelled.can_transition_to(next));
        }
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_cancel_only_from_live_states() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::RetryScheduled.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::InProgress.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::RetryScheduled.can_transition_to(JobStatus::InProgress));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::CRITICAL > Priority::HIGH);
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority::LOW);
        assert!(Priority::HIGH.is_elevated());
        assert!(!Priority(9).is_elevated());
    }

    #[test]
    fn test_status_parses_from_str() {
        assert_eq!("in_progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::RetryScheduled).unwrap();
        assert_eq!(json, "\"retry_scheduled\"");
    }
}
