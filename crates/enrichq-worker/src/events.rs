//! Typed lifecycle events.
//!
//! Workers report outcomes to their lane's dispatcher as [`WorkerEvent`]s
//! over an mpsc channel; the dispatcher applies them to the store and
//! rebroadcasts the public [`JobEvent`]s to subscribers.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use enrichq_entity::{JobId, JobType, Priority};

use crate::lane::Lane;

/// Public job lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job record was created and routed.
    Enqueued {
        job_id: JobId,
        job_type: JobType,
        lane: Lane,
        priority: Priority,
    },
    /// A worker claimed the job.
    Started {
        job_id: JobId,
        lane: Lane,
        attempt: u32,
    },
    /// The handler reported progress.
    Progress {
        job_id: JobId,
        percentage: u8,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    /// The job missed its heartbeat and is being re-run in place.
    Stalled {
        job_id: JobId,
        lane: Lane,
        stalled_count: u32,
    },
    /// The job finished with a result.
    Completed { job_id: JobId, lane: Lane },
    /// The job failed and will not be retried automatically.
    Failed {
        job_id: JobId,
        lane: Lane,
        error: String,
        retry_count: i32,
    },
    /// The job failed and a backoff retry was scheduled.
    RetryScheduled {
        job_id: JobId,
        lane: Lane,
        retry_count: i32,
        delay_ms: u64,
    },
    /// The job was cancelled.
    Cancelled { job_id: JobId },
}

impl JobEvent {
    /// The job this event is about.
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Stalled { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::RetryScheduled { job_id, .. }
            | Self::Cancelled { job_id } => job_id,
        }
    }

    /// Whether no further events follow for the job unless an operator retries it.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Outcome a worker hands to its lane's dispatcher.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The handler returned a result.
    Completed { job_id: JobId, result: Value },
    /// The attempt failed. `retryable` is false for permanent failures.
    Failed {
        job_id: JobId,
        error: String,
        retryable: bool,
    },
    /// The heartbeat went quiet; the handler is re-run in place.
    Stalled { job_id: JobId, stalled_count: u32 },
    /// The handler observed a cancel and gave up.
    Cancelled { job_id: JobId },
}

/// Broadcast fan-out for [`JobEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}
