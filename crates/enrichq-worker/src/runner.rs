//! Lane worker: claims jobs from one lane and runs them under its concurrency cap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing;

use enrichq_cache::ProgressChannel;
use enrichq_database::JobStore;
use enrichq_entity::{Job, JobId, JobStatus, JobUpdate};

use crate::events::{EventBus, JobEvent, WorkerEvent};
use crate::executor::{JobExecutionError, JobExecutor};
use crate::lane::{Lane, LaneSettings};
use crate::progress::{Heartbeat, JobContext, ProgressReporter};
use crate::queue::LaneQueue;

/// Failure message once a job stalls more often than its lane tolerates.
pub const STALLED_LIMIT_MESSAGE: &str = "job stalled more than allowable limit";

/// Cancellation tokens of jobs currently running, shared across lanes.
pub type InflightJobs = Arc<DashMap<JobId, CancellationToken>>;

/// Resolve once shutdown is signalled or the sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Worker pool for a single lane.
#[derive(Debug)]
pub struct LaneWorker {
    lane: Lane,
    settings: LaneSettings,
    queue: Arc<LaneQueue>,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    progress: ProgressChannel,
    events: EventBus,
    inflight: InflightJobs,
    dispatch: mpsc::Sender<WorkerEvent>,
    job_timeout: Option<Duration>,
    shutdown_grace: Duration,
}

/// Shared handles a [`LaneWorker`] runs against.
#[derive(Debug, Clone)]
pub struct WorkerDeps {
    /// Durable job store.
    pub store: Arc<dyn JobStore>,
    /// Handler registry.
    pub executor: Arc<JobExecutor>,
    /// Progress channel.
    pub progress: ProgressChannel,
    /// Public event bus.
    pub events: EventBus,
    /// Running job tokens.
    pub inflight: InflightJobs,
    /// Hard ceiling per handler run.
    pub job_timeout: Option<Duration>,
    /// Time allowed for in-flight jobs on shutdown.
    pub shutdown_grace: Duration,
}

impl LaneWorker {
    /// Create a worker pool for `queue`'s lane.
    pub fn new(
        settings: LaneSettings,
        queue: Arc<LaneQueue>,
        deps: WorkerDeps,
        dispatch: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            lane: queue.lane(),
            settings,
            queue,
            store: deps.store,
            executor: deps.executor,
            progress: deps.progress,
            events: deps.events,
            inflight: deps.inflight,
            dispatch,
            job_timeout: deps.job_timeout,
            shutdown_grace: deps.shutdown_grace,
        }
    }

    /// Run until the shutdown signal is received, then drain in-flight jobs.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            lane = %self.lane,
            concurrency = self.settings.concurrency,
            stall_interval_ms = self.settings.stall_interval.as_millis() as u64,
            max_stalled = self.settings.max_stalled_count,
            "Lane worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));

        loop {
            let permit = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job_id = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                job_id = self.queue.pop() => job_id,
            };

            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                worker.process(job_id).await;
                worker.queue.finish().await;
            });
        }

        tracing::info!(lane = %self.lane, "Lane worker waiting for in-flight jobs");

        let permits = self.settings.concurrency as u32;
        if tokio::time::timeout(self.shutdown_grace, semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            tracing::warn!(lane = %self.lane, "Shutdown grace elapsed with jobs still running");
        }

        tracing::info!(lane = %self.lane, "Lane worker shut down");
    }

    /// Claim a job and run it to an outcome.
    async fn process(&self, job_id: JobId) {
        let Some(job) = self.claim(&job_id).await else {
            return;
        };

        let token = CancellationToken::new();
        self.inflight.insert(job_id.clone(), token.clone());

        self.events.emit(JobEvent::Started {
            job_id: job_id.clone(),
            lane: self.lane,
            attempt: (job.retry_count + 1) as u32,
        });

        let event = self.run_attempts(&job, &token).await;
        self.inflight.remove(&job_id);

        if self.dispatch.send(event).await.is_err() {
            tracing::error!(lane = %self.lane, job_id = %job_id, "Dispatcher gone; outcome dropped");
        }
    }

    /// Move the job to `in_progress`, passing through `pending` after a backoff.
    async fn claim(&self, job_id: &JobId) -> Option<Job> {
        let job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(lane = %self.lane, job_id = %job_id, "Queued job missing from store");
                return None;
            }
            Err(e) => {
                tracing::error!(lane = %self.lane, job_id = %job_id, error = %e, "Failed to load job");
                return None;
            }
        };

        match job.status {
            JobStatus::Pending => {}
            JobStatus::RetryScheduled => {
                if let Err(e) = self.store.update(job_id, &JobUpdate::pending()).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Retry no longer claimable");
                    return None;
                }
            }
            status => {
                tracing::debug!(job_id = %job_id, %status, "Skipping job that is no longer pending");
                return None;
            }
        }

        match self
            .store
            .update(job_id, &JobUpdate::in_progress(Utc::now()))
            .await
        {
            Ok(job) => Some(job),
            Err(e) if e.is_conflict() => {
                tracing::debug!(job_id = %job_id, error = %e, "Lost claim race");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark job in progress");
                None
            }
        }
    }

    /// Run the handler, re-running it in place after each stall.
    async fn run_attempts(&self, job: &Job, token: &CancellationToken) -> WorkerEvent {
        let job_id = job.id.clone();
        let mut stalled_count = 0u32;

        loop {
            let heartbeat = Arc::new(Heartbeat::new());
            let reporter = ProgressReporter::new(
                job_id.clone(),
                job.retry_count as u32 + stalled_count + 1,
                self.progress.clone(),
                Arc::clone(&heartbeat),
                self.events.clone(),
                self.settings.stall_interval,
            );
            let ctx = JobContext::new(reporter, token.clone());

            let outcome = tokio::select! {
                result = self.execute(job, &ctx) => Some(result),
                _ = heartbeat.stalled(self.settings.stall_interval) => None,
            };

            if let Some(result) = outcome {
                return Self::outcome_event(job_id, result);
            }

            stalled_count += 1;
            if token.is_cancelled() {
                return WorkerEvent::Cancelled { job_id };
            }
            if stalled_count > self.settings.max_stalled_count {
                tracing::warn!(
                    lane = %self.lane,
                    job_id = %job_id,
                    stalled_count,
                    "Job exceeded stall limit"
                );
                return WorkerEvent::Failed {
                    job_id,
                    error: STALLED_LIMIT_MESSAGE.to_string(),
                    retryable: true,
                };
            }

            tracing::warn!(
                lane = %self.lane,
                job_id = %job_id,
                stalled_count,
                "Job stalled; running it again"
            );
            let stalled = WorkerEvent::Stalled {
                job_id: job_id.clone(),
                stalled_count,
            };
            if self.dispatch.send(stalled).await.is_err() {
                tracing::error!(lane = %self.lane, job_id = %job_id, "Dispatcher gone; stall dropped");
            }
        }
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<serde_json::Value, JobExecutionError> {
        match self.job_timeout {
            Some(limit) => tokio::time::timeout(limit, self.executor.execute(job, ctx))
                .await
                .unwrap_or_else(|_| {
                    Err(JobExecutionError::Transient(format!(
                        "job exceeded hard timeout of {limit:?}"
                    )))
                }),
            None => self.executor.execute(job, ctx).await,
        }
    }

    fn outcome_event(job_id: JobId, result: Result<serde_json::Value, JobExecutionError>) -> WorkerEvent {
        match result {
            Ok(result) => WorkerEvent::Completed { job_id, result },
            Err(JobExecutionError::Cancelled) => WorkerEvent::Cancelled { job_id },
            Err(e) => WorkerEvent::Failed {
                job_id,
                error: e.message(),
                retryable: e.is_retryable(),
            },
        }
    }
}
