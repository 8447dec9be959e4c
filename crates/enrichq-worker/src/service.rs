//! Queue admin API.
//!
//! [`QueueService`] is constructed once per process and owns the lanes,
//! their worker pools, and their dispatchers. Callers enqueue, poll,
//! cancel, and retry through it; nothing is ambient global state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing;

use enrichq_cache::ProgressChannel;
use enrichq_core::error::AppError;
use enrichq_core::result::AppResult;
use enrichq_database::JobStore;
use enrichq_entity::{
    Job, JobId, JobPayload, JobStatus, JobType, JobUpdate, NewJob, Priority, ProgressRecord,
};

use crate::dispatcher::{Dispatcher, interrupted_event};
use crate::events::{EventBus, JobEvent, WorkerEvent};
use crate::executor::JobExecutor;
use crate::lane::Lane;
use crate::queue::{LaneCounts, LaneQueue};
use crate::retention::purge_expired;
use crate::retry::RetryPolicy;
use crate::runner::{InflightJobs, LaneWorker, WorkerDeps};
use crate::settings::QueueSettings;

pub use crate::retention::CleanupReport;

const EVENT_BUS_CAPACITY: usize = 1024;
const DISPATCH_BUFFER: usize = 256;

/// Options for [`QueueService::enqueue`].
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Routing priority.
    pub priority: Priority,
    /// Defer visibility by this long.
    pub delay: Option<Duration>,
    /// Override the priority-derived retry budget.
    pub max_retries: Option<i32>,
    /// Use this id instead of generating one.
    pub job_id: Option<JobId>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: Priority::NORMAL,
            delay: None,
            max_retries: None,
            job_id: None,
        }
    }
}

impl EnqueueOptions {
    /// Options with the given priority.
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Merged view of a job's durable record and its latest progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub job_type: JobType,
    pub priority: Priority,
    pub lane: Lane,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressRecord>,
    /// Milliseconds since the last progress write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub stalled_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusView {
    fn new(job: Job, progress: Option<ProgressRecord>, now: DateTime<Utc>) -> Self {
        Self {
            lane: Lane::for_priority(job.priority),
            progress_age_ms: progress.as_ref().map(|p| p.age_ms(now)),
            progress,
            id: job.id,
            job_type: job.job_type,
            priority: job.priority,
            status: job.status,
            result: job.result,
            error: job.error,
            last_error: job.last_error,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            stalled_count: job.stalled_count,
            run_at: job.run_at,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: job.updated_at,
        }
    }
}

/// Counts for one lane.
#[derive(Debug, Clone, Serialize)]
pub struct LaneStats {
    pub lane: Lane,
    #[serde(flatten)]
    pub counts: LaneCounts,
}

/// Per-lane counts plus their totals.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub lanes: Vec<LaneStats>,
    pub totals: LaneCounts,
}

impl QueueStats {
    /// Counts for one lane.
    pub fn lane(&self, lane: Lane) -> LaneCounts {
        self.lanes
            .iter()
            .find(|stats| stats.lane == lane)
            .map(|stats| stats.counts)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct Running {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    dispatchers: Vec<JoinHandle<()>>,
}

/// The enrichment queue: lanes, worker pools, and the admin API.
#[derive(Debug)]
pub struct QueueService {
    store: Arc<dyn JobStore>,
    progress: ProgressChannel,
    executor: Arc<JobExecutor>,
    settings: QueueSettings,
    lanes: [Arc<LaneQueue>; 4],
    inflight: InflightJobs,
    events: EventBus,
    running: Mutex<Option<Running>>,
}

impl QueueService {
    /// Build a stopped service. Jobs may be enqueued before [`QueueService::start`].
    pub fn new(
        store: Arc<dyn JobStore>,
        progress: ProgressChannel,
        executor: JobExecutor,
        settings: QueueSettings,
    ) -> Self {
        let lanes = Lane::ALL.map(|lane| Arc::new(LaneQueue::new(lane, settings.lane(lane))));
        Self {
            store,
            progress,
            executor: Arc::new(executor),
            settings,
            lanes,
            inflight: Arc::new(DashMap::new()),
            events: EventBus::new(EVENT_BUS_CAPACITY),
            running: Mutex::new(None),
        }
    }

    /// Resolved settings.
    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// The durable store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    fn lane_queue(&self, lane: Lane) -> &Arc<LaneQueue> {
        &self.lanes[lane.index()]
    }

    /// Spawn the lane workers and dispatchers, then recover unfinished jobs.
    ///
    /// Fails with a configuration error if any job type lacks a handler.
    pub async fn start(&self) -> AppResult<()> {
        let missing = self.executor.missing_types();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
            return Err(AppError::configuration(format!(
                "No handler registered for job types: {}",
                names.join(", ")
            )));
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("Queue service already started");
            return Ok(());
        }

        let (shutdown_tx, _) = watch::channel(false);
        let deps = WorkerDeps {
            store: Arc::clone(&self.store),
            executor: Arc::clone(&self.executor),
            progress: self.progress.clone(),
            events: self.events.clone(),
            inflight: Arc::clone(&self.inflight),
            job_timeout: self.settings.job_timeout,
            shutdown_grace: self.settings.shutdown_grace,
        };

        let mut workers = Vec::with_capacity(Lane::ALL.len());
        let mut dispatchers = Vec::with_capacity(Lane::ALL.len());
        let mut senders = Vec::with_capacity(Lane::ALL.len());

        for lane in Lane::ALL {
            let queue = Arc::clone(self.lane_queue(lane));
            let (tx, rx) = mpsc::channel(DISPATCH_BUFFER);

            let dispatcher = Dispatcher::new(
                Arc::clone(&queue),
                Arc::clone(&self.store),
                self.events.clone(),
                RetryPolicy::new(self.settings.base_backoff),
            );
            dispatchers.push(tokio::spawn(dispatcher.run(rx)));

            let worker = Arc::new(LaneWorker::new(
                self.settings.lane(lane).clone(),
                queue,
                deps.clone(),
                tx.clone(),
            ));
            workers.push(tokio::spawn(worker.run(shutdown_tx.subscribe())));
            senders.push(tx);
        }

        let recovered = self.recover(&senders).await?;
        tracing::info!(recovered, "Queue service started");

        *running = Some(Running {
            shutdown_tx,
            workers,
            dispatchers,
        });
        Ok(())
    }

    /// Re-route jobs left unfinished by a previous process.
    async fn recover(&self, senders: &[mpsc::Sender<WorkerEvent>]) -> AppResult<usize> {
        let jobs = self
            .store
            .list_by_status(&[
                JobStatus::Pending,
                JobStatus::RetryScheduled,
                JobStatus::InProgress,
            ])
            .await?;

        let count = jobs.len();
        for job in jobs {
            let lane = Lane::for_priority(job.priority);
            if let Some(event) = interrupted_event(&job) {
                tracing::warn!(job_id = %job.id, %lane, "Recovering interrupted job");
                senders[lane.index()].send(event).await.map_err(|_| {
                    AppError::internal(format!("Dispatcher for lane '{lane}' stopped"))
                })?;
            } else {
                self.route(&job).await;
            }
        }
        Ok(count)
    }

    /// Place a job in its lane, honouring any remaining delay.
    async fn route(&self, job: &Job) {
        let remaining = job
            .run_at
            .and_then(|at| (at - Utc::now()).to_std().ok());
        let ready_at = match remaining {
            None => None,
            Some(remaining) => match Instant::now().checked_add(remaining) {
                Some(at) => Some(at),
                None => {
                    tracing::warn!(job_id = %job.id, run_at = ?job.run_at, "Run time out of range; not routed");
                    return;
                }
            },
        };
        self.lane_queue(Lane::for_priority(job.priority))
            .push(job.id.clone(), job.priority, ready_at)
            .await;
    }

    /// Signal the workers to stop, wait for in-flight jobs, and drain dispatchers.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        tracing::info!("Queue service shutting down");
        let _ = running.shutdown_tx.send(true);

        for worker in running.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Lane worker task failed");
            }
        }

        for mut dispatcher in running.dispatchers {
            if tokio::time::timeout(self.settings.shutdown_grace, &mut dispatcher)
                .await
                .is_err()
            {
                tracing::warn!("Dispatcher did not drain in time; aborting");
                dispatcher.abort();
            }
        }

        tracing::info!("Queue service stopped");
    }

    /// Create a durable record and route it to its lane.
    ///
    /// Payload validation happens in the handler; only an unregistered job
    /// type is rejected here.
    pub async fn enqueue(&self, payload: JobPayload, options: EnqueueOptions) -> AppResult<JobId> {
        let job_type = payload.job_type();
        if !self.executor.has_handler(job_type) {
            return Err(AppError::internal(format!(
                "No handler registered for job type '{job_type}'"
            )));
        }

        let now = Utc::now();
        let priority = options.priority;
        let (run_at, ready_at) = match options.delay {
            None => (None, None),
            Some(delay) => {
                let run_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d));
                match (run_at, Instant::now().checked_add(delay)) {
                    (Some(run_at), Some(ready_at)) => (Some(run_at), Some(ready_at)),
                    _ => {
                        return Err(AppError::validation(format!(
                            "Delay of {delay:?} is out of range"
                        )));
                    }
                }
            }
        };
        let max_retries = options
            .max_retries
            .unwrap_or_else(|| self.settings.max_retries_for(priority))
            .max(0);

        let job = Job::from_new(
            NewJob {
                id: options.job_id,
                payload,
                priority,
                max_retries,
                run_at,
            },
            now,
        );
        self.store.create(&job).await?;

        let lane = Lane::for_priority(priority);
        self.lane_queue(lane)
            .push(job.id.clone(), priority, ready_at)
            .await;

        tracing::info!(job_id = %job.id, %job_type, %lane, priority = priority.value(), "Job enqueued");
        self.events.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            job_type,
            lane,
            priority,
        });
        Ok(job.id)
    }

    /// Current status merged with the latest progress, `None` for unknown ids.
    ///
    /// Progress is best-effort: a progress read failure yields no progress.
    pub async fn get_status(&self, job_id: &JobId) -> AppResult<Option<JobStatusView>> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(None);
        };

        let progress = match self.progress.latest(job_id).await {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Progress unavailable");
                None
            }
        };

        Ok(Some(JobStatusView::new(job, progress, Utc::now())))
    }

    /// Cancel a job. Returns whether it was removed from a lane before a
    /// worker claimed it.
    ///
    /// A running job gets its cancellation token tripped and its record
    /// marked cancelled; the handler is not interrupted. Unknown and
    /// already-finished jobs return `false`.
    pub async fn cancel(&self, job_id: &JobId) -> AppResult<bool> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(false);
        };
        if !job.status.is_cancellable() {
            return Ok(false);
        }

        let removed = self
            .lane_queue(Lane::for_priority(job.priority))
            .remove(job_id)
            .await;
        if let Some(token) = self.inflight.get(job_id) {
            token.cancel();
        }

        match self.store.update(job_id, &JobUpdate::cancelled()).await {
            Ok(_) => {
                tracing::info!(job_id = %job_id, removed, "Job cancelled");
                self.events.emit(JobEvent::Cancelled {
                    job_id: job_id.clone(),
                });
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(job_id = %job_id, error = %e, "Job finished before cancel");
            }
            Err(e) => return Err(e),
        }

        Ok(removed)
    }

    /// Re-run a failed job that still has retry budget. Returns `false`
    /// for any other job.
    pub async fn retry(&self, job_id: &JobId) -> AppResult<bool> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(false);
        };
        if !job.can_retry() {
            return Ok(false);
        }

        let retry_count = job.retry_count + 1;
        let update = JobUpdate::retry_scheduled(retry_count, Utc::now());
        let job = match self.store.update(job_id, &update).await {
            Ok(job) => job,
            Err(e) if e.is_conflict() => return Ok(false),
            Err(e) => return Err(e),
        };

        let lane = Lane::for_priority(job.priority);
        self.lane_queue(lane)
            .push(job.id.clone(), job.priority, None)
            .await;

        tracing::info!(job_id = %job_id, retry_count, "Job retried by operator");
        self.events.emit(JobEvent::RetryScheduled {
            job_id: job_id.clone(),
            lane,
            retry_count,
            delay_ms: 0,
        });
        Ok(true)
    }

    /// Per-lane counts and their totals.
    pub async fn stats(&self) -> QueueStats {
        let mut lanes = Vec::with_capacity(Lane::ALL.len());
        let mut totals = LaneCounts::default();
        for lane in Lane::ALL {
            let counts = self.lane_queue(lane).counts().await;
            totals.absorb(&counts);
            lanes.push(LaneStats { lane, counts });
        }
        QueueStats { lanes, totals }
    }

    /// Delete terminal jobs last updated more than `older_than_days` ago,
    /// together with their progress entries.
    pub async fn cleanup(&self, older_than_days: u32) -> AppResult<CleanupReport> {
        purge_expired(self.store.as_ref(), Some(&self.progress), older_than_days).await
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
