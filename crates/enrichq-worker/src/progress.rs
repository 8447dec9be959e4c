//! Progress reporting and heartbeats for running jobs.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use enrichq_cache::ProgressChannel;
use enrichq_entity::{JobId, ProgressRecord};

use crate::events::{EventBus, JobEvent};

/// Last sign of life from a running handler.
#[derive(Debug)]
pub struct Heartbeat {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Heartbeat {
    /// Start a heartbeat that counts as fresh now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    /// Record a sign of life.
    pub fn beat(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// When the last beat happened.
    pub fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }

    /// Resolve once no beat has been seen for `interval`.
    pub async fn stalled(&self, interval: Duration) {
        loop {
            let deadline = self.last() + interval;
            tokio::time::sleep_until(deadline).await;
            if self.last().elapsed() >= interval {
                return;
            }
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes progress for one run of a job and keeps its heartbeat fresh.
///
/// Percentages never go backwards within a run. Progress is best-effort:
/// a failed write is logged and never fails the job.
#[derive(Debug)]
pub struct ProgressReporter {
    job_id: JobId,
    attempt: u32,
    channel: ProgressChannel,
    heartbeat: Arc<Heartbeat>,
    events: EventBus,
    keep_alive_period: Duration,
    percentage: AtomicU8,
}

impl ProgressReporter {
    /// Create a reporter for one handler run.
    pub fn new(
        job_id: JobId,
        attempt: u32,
        channel: ProgressChannel,
        heartbeat: Arc<Heartbeat>,
        events: EventBus,
        stall_interval: Duration,
    ) -> Self {
        Self {
            job_id,
            attempt,
            channel,
            heartbeat,
            events,
            keep_alive_period: (stall_interval / 2).max(Duration::from_millis(1)),
            percentage: AtomicU8::new(0),
        }
    }

    /// Job being reported on.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Run number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Highest percentage reported so far in this run.
    pub fn percentage(&self) -> u8 {
        self.percentage.load(Ordering::Relaxed)
    }

    /// Report a percentage and message.
    pub async fn report(&self, percentage: u8, message: impl Into<String>) {
        let percentage = self.advance(percentage);
        let record = ProgressRecord::new(self.job_id.clone(), self.attempt, percentage, message);
        self.publish(record).await;
    }

    /// Report a named stage.
    pub async fn report_stage(&self, percentage: u8, stage: &str, message: impl Into<String>) {
        let percentage = self.advance(percentage);
        let record = ProgressRecord::new(self.job_id.clone(), self.attempt, percentage, message)
            .with_stage(stage);
        self.publish(record).await;
    }

    /// Report `completed` of `total` items done.
    pub async fn report_items(&self, completed: u64, total: u64, message: impl Into<String>) {
        let raw = if total == 0 {
            100
        } else {
            (completed.min(total) * 100 / total) as u8
        };
        let percentage = self.advance(raw);
        let record = ProgressRecord::new(self.job_id.clone(), self.attempt, percentage, message)
            .with_counts(completed, total);
        self.publish(record).await;
    }

    /// Await `fut`, heartbeating at half the stall interval until it resolves.
    ///
    /// Wrap long external calls that cannot report intermediate progress.
    pub async fn keep_alive<F: Future>(&self, fut: F) -> F::Output {
        tokio::pin!(fut);
        let mut ticker = tokio::time::interval(self.keep_alive_period);
        loop {
            tokio::select! {
                output = &mut fut => return output,
                _ = ticker.tick() => self.heartbeat.beat(),
            }
        }
    }

    fn advance(&self, percentage: u8) -> u8 {
        let percentage = percentage.min(100);
        self.percentage.fetch_max(percentage, Ordering::Relaxed).max(percentage)
    }

    async fn publish(&self, record: ProgressRecord) {
        self.heartbeat.beat();
        if let Err(e) = self.channel.publish(&record).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to publish progress");
        }
        self.events.emit(JobEvent::Progress {
            job_id: record.job_id,
            percentage: record.percentage,
            message: record.message,
            completed: record.completed,
            total: record.total,
        });
    }
}

/// Everything a handler gets besides the job itself.
#[derive(Debug)]
pub struct JobContext {
    reporter: ProgressReporter,
    cancel: CancellationToken,
}

impl JobContext {
    /// Bundle a reporter and the job's cancellation token.
    pub fn new(reporter: ProgressReporter, cancel: CancellationToken) -> Self {
        Self { reporter, cancel }
    }

    /// Progress reporter for this run.
    pub fn progress(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Whether the job was cancelled while running.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
