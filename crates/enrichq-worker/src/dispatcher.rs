//! Per-lane dispatcher: applies worker outcomes to the durable store,
//! runs the backoff retry policy, and publishes lifecycle events.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing;

use enrichq_core::error::AppError;
use enrichq_database::JobStore;
use enrichq_entity::{Job, JobId, JobStatus, JobUpdate};

use crate::events::{EventBus, JobEvent, WorkerEvent};
use crate::lane::Lane;
use crate::queue::LaneQueue;
use crate::retry::RetryPolicy;

/// Consumes [`WorkerEvent`]s for one lane.
#[derive(Debug)]
pub struct Dispatcher {
    lane: Lane,
    queue: Arc<LaneQueue>,
    store: Arc<dyn JobStore>,
    events: EventBus,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Create a dispatcher for `queue`'s lane.
    pub fn new(
        queue: Arc<LaneQueue>,
        store: Arc<dyn JobStore>,
        events: EventBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lane: queue.lane(),
            queue,
            store,
            events,
            retry,
        }
    }

    /// Apply events until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<WorkerEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        tracing::debug!(lane = %self.lane, "Dispatcher stopped");
    }

    /// Apply a single event.
    pub async fn handle(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Completed { job_id, result } => self.on_completed(job_id, result).await,
            WorkerEvent::Failed {
                job_id,
                error,
                retryable,
            } => self.on_failed(job_id, error, retryable).await,
            WorkerEvent::Stalled {
                job_id,
                stalled_count,
            } => self.on_stalled(job_id, stalled_count).await,
            WorkerEvent::Cancelled { job_id } => self.on_cancelled(job_id).await,
        }
    }

    async fn on_completed(&self, job_id: JobId, result: serde_json::Value) {
        let update = JobUpdate::completed(result, Utc::now());
        match self.store.update(&job_id, &update).await {
            Ok(_) => {
                tracing::info!(lane = %self.lane, job_id = %job_id, "Job completed");
                self.queue.record_completed(job_id.clone()).await;
                self.events.emit(JobEvent::Completed {
                    job_id,
                    lane: self.lane,
                });
            }
            Err(e) => self.rejected(&job_id, "completion", &e),
        }
    }

    async fn on_failed(&self, job_id: JobId, error: String, retryable: bool) {
        let job = match self.store.update(&job_id, &JobUpdate::failed(&error)).await {
            Ok(job) => job,
            Err(e) => return self.rejected(&job_id, "failure", &e),
        };

        tracing::warn!(
            lane = %self.lane,
            job_id = %job_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            retryable,
            %error,
            "Job failed"
        );

        if retryable && self.schedule_retry(&job).await {
            return;
        }

        self.queue.record_failed(job_id.clone()).await;
        self.events.emit(JobEvent::Failed {
            job_id,
            lane: self.lane,
            error,
            retry_count: job.retry_count,
        });
    }

    /// Schedule a backoff retry if budget remains. Returns whether one was scheduled.
    async fn schedule_retry(&self, job: &Job) -> bool {
        let Some(retry) = self.retry.next(job) else {
            return false;
        };

        let run_at = chrono::Duration::from_std(retry.delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay));
        let (Some(run_at), Some(ready_at)) = (run_at, Instant::now().checked_add(retry.delay))
        else {
            tracing::error!(
                lane = %self.lane,
                job_id = %job.id,
                delay = ?retry.delay,
                "Retry delay out of range; failing job"
            );
            return false;
        };
        let update = JobUpdate::retry_scheduled(retry.retry_count, run_at);
        if let Err(e) = self.store.update(&job.id, &update).await {
            self.rejected(&job.id, "retry", &e);
            return false;
        }

        self.queue
            .push(job.id.clone(), job.priority, Some(ready_at))
            .await;

        tracing::info!(
            lane = %self.lane,
            job_id = %job.id,
            retry_count = retry.retry_count,
            delay_ms = retry.delay.as_millis() as u64,
            "Retry scheduled"
        );
        self.events.emit(JobEvent::RetryScheduled {
            job_id: job.id.clone(),
            lane: self.lane,
            retry_count: retry.retry_count,
            delay_ms: retry.delay.as_millis() as u64,
        });
        true
    }

    async fn on_stalled(&self, job_id: JobId, stalled_count: u32) {
        let update = JobUpdate::stalled(stalled_count as i32);
        match self.store.update(&job_id, &update).await {
            Ok(_) => self.events.emit(JobEvent::Stalled {
                job_id,
                lane: self.lane,
                stalled_count,
            }),
            Err(e) => self.rejected(&job_id, "stall", &e),
        }
    }

    async fn on_cancelled(&self, job_id: JobId) {
        match self.store.update(&job_id, &JobUpdate::cancelled()).await {
            Ok(_) => self.events.emit(JobEvent::Cancelled { job_id }),
            Err(e) if e.is_conflict() => {
                // Already cancelled by the admin API.
                tracing::debug!(lane = %self.lane, job_id = %job_id, "Job already cancelled");
            }
            Err(e) => self.rejected(&job_id, "cancellation", &e),
        }
    }

    fn rejected(&self, job_id: &JobId, what: &str, err: &AppError) {
        if err.is_conflict() {
            tracing::info!(
                lane = %self.lane,
                job_id = %job_id,
                error = %err,
                "Discarding late {what}; job state moved on"
            );
        } else {
            tracing::error!(
                lane = %self.lane,
                job_id = %job_id,
                error = %err,
                "Failed to record {what}"
            );
        }
    }
}

/// Re-route a job found `in_progress` at start-up: it is presumed stalled,
/// failed, and handed to the retry policy.
pub(crate) fn interrupted_event(job: &Job) -> Option<WorkerEvent> {
    (job.status == JobStatus::InProgress).then(|| WorkerEvent::Failed {
        job_id: job.id.clone(),
        error: format!(
            "{}: worker stopped while the job was running",
            crate::runner::STALLED_LIMIT_MESSAGE
        ),
        retryable: true,
    })
}
