//! In-process lane queue: a priority heap of ready jobs plus a delayed set.
//!
//! The durable store owns job state; a lane only holds ids waiting to be
//! claimed, so losing it on restart is recovered by re-routing from the
//! store.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use enrichq_entity::{JobId, Priority};

use crate::lane::{Lane, LaneSettings};

/// Per-lane job counts reported by stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaneCounts {
    /// Claimable now.
    pub waiting: usize,
    /// Waiting for an enqueue delay or backoff to elapse.
    pub delayed: usize,
    /// Claimed by a worker.
    pub active: usize,
    /// Recently completed ids retained by the lane.
    pub completed: usize,
    /// Recently failed ids retained by the lane.
    pub failed: usize,
}

impl LaneCounts {
    /// Add another lane's counts into this one.
    pub fn absorb(&mut self, other: &LaneCounts) {
        self.waiting += other.waiting;
        self.delayed += other.delayed;
        self.active += other.active;
        self.completed += other.completed;
        self.failed += other.failed;
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    seq: u64,
    id: JobId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence (FIFO).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DelayedEntry {
    ready_at: Instant,
    seq: u64,
    priority: Priority,
    id: JobId,
}

#[derive(Debug, Clone, Copy)]
struct Membership {
    seq: u64,
    delayed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<Reverse<DelayedEntry>>,
    // Live entries; heap entries whose seq no longer matches are skipped.
    members: HashMap<JobId, Membership>,
    active: usize,
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl Inner {
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse(top)) = self.delayed.peek() {
            if top.ready_at > now {
                break;
            }
            let Some(Reverse(entry)) = self.delayed.pop() else {
                break;
            };
            if let Some(member) = self.members.get_mut(&entry.id) {
                if member.seq == entry.seq {
                    member.delayed = false;
                    self.ready.push(ReadyEntry {
                        priority: entry.priority,
                        seq: entry.seq,
                        id: entry.id,
                    });
                }
            }
        }
    }

    fn pop_ready(&mut self) -> Option<JobId> {
        while let Some(entry) = self.ready.pop() {
            let live = self
                .members
                .get(&entry.id)
                .is_some_and(|member| member.seq == entry.seq);
            if live {
                self.members.remove(&entry.id);
                return Some(entry.id);
            }
        }
        None
    }

    fn next_due(&mut self) -> Option<Instant> {
        while let Some(Reverse(top)) = self.delayed.peek() {
            let live = self
                .members
                .get(&top.id)
                .is_some_and(|member| member.seq == top.seq);
            if live {
                return Some(top.ready_at);
            }
            self.delayed.pop();
        }
        None
    }
}

fn retain(ring: &mut VecDeque<JobId>, id: JobId, keep: usize) {
    ring.retain(|existing| existing != &id);
    ring.push_back(id);
    while ring.len() > keep {
        ring.pop_front();
    }
}

/// Ready heap plus delayed set for one lane.
#[derive(Debug)]
pub struct LaneQueue {
    lane: Lane,
    keep_completed: usize,
    keep_failed: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl LaneQueue {
    /// Create an empty lane queue.
    pub fn new(lane: Lane, settings: &LaneSettings) -> Self {
        Self {
            lane,
            keep_completed: settings.keep_completed,
            keep_failed: settings.keep_failed,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// The lane this queue serves.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Add a job, claimable at `ready_at` (immediately when `None`).
    ///
    /// Re-pushing an id that is already queued replaces the old entry. A
    /// re-queued id leaves the completed and failed rings.
    pub async fn push(&self, id: JobId, priority: Priority, ready_at: Option<Instant>) {
        let mut inner = self.inner.lock().await;
        inner.completed.retain(|existing| existing != &id);
        inner.failed.retain(|existing| existing != &id);
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let delayed = ready_at.is_some_and(|at| at > Instant::now());
        inner.members.insert(id.clone(), Membership { seq, delayed });

        match ready_at {
            Some(ready_at) if delayed => {
                inner.delayed.push(Reverse(DelayedEntry {
                    ready_at,
                    seq,
                    priority,
                    id: id.clone(),
                }));
            }
            _ => inner.ready.push(ReadyEntry {
                priority,
                seq,
                id: id.clone(),
            }),
        }
        drop(inner);

        debug!(lane = %self.lane, job_id = %id, delayed, "Queued job");
        self.notify.notify_one();
    }

    /// Remove a queued job. Returns `false` if it was not waiting here.
    pub async fn remove(&self, id: &JobId) -> bool {
        let removed = self.inner.lock().await.members.remove(id).is_some();
        if removed {
            debug!(lane = %self.lane, job_id = %id, "Removed job from lane");
        }
        removed
    }

    /// Whether a job is waiting in this lane.
    pub async fn contains(&self, id: &JobId) -> bool {
        self.inner.lock().await.members.contains_key(id)
    }

    /// Claim the next ready job without waiting.
    pub async fn try_pop(&self) -> Option<JobId> {
        let mut inner = self.inner.lock().await;
        inner.promote_due(Instant::now());
        let id = inner.pop_ready()?;
        inner.active += 1;
        Some(id)
    }

    /// Wait for and claim the next ready job.
    ///
    /// Cancel-safe: a dropped call never loses a job.
    pub async fn pop(&self) -> JobId {
        loop {
            let next_due = {
                let mut inner = self.inner.lock().await;
                inner.promote_due(Instant::now());
                if let Some(id) = inner.pop_ready() {
                    inner.active += 1;
                    return id;
                }
                inner.next_due()
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Release a claim taken by [`LaneQueue::pop`].
    pub async fn finish(&self) {
        let mut inner = self.inner.lock().await;
        inner.active = inner.active.saturating_sub(1);
    }

    /// Remember a completed job id.
    pub async fn record_completed(&self, id: JobId) {
        let mut inner = self.inner.lock().await;
        retain(&mut inner.completed, id, self.keep_completed);
    }

    /// Remember a failed job id.
    pub async fn record_failed(&self, id: JobId) {
        let mut inner = self.inner.lock().await;
        retain(&mut inner.failed, id, self.keep_failed);
    }

    /// Current counts.
    pub async fn counts(&self) -> LaneCounts {
        let inner = self.inner.lock().await;
        let delayed = inner.members.values().filter(|m| m.delayed).count();
        LaneCounts {
            waiting: inner.members.len() - delayed,
            delayed,
            active: inner.active,
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue() -> LaneQueue {
        LaneQueue::new(Lane::Normal, &LaneSettings::defaults(Lane::Normal))
    }

    fn id(s: &str) -> JobId {
        JobId::from(s)
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let q = queue();
        q.push(id("a"), Priority(5), None).await;
        q.push(id("b"), Priority(8), None).await;
        q.push(id("c"), Priority(5), None).await;

        assert_eq!(q.try_pop().await, Some(id("b")));
        assert_eq!(q.try_pop().await, Some(id("a")));
        assert_eq!(q.try_pop().await, Some(id("c")));
        assert_eq!(q.try_pop().await, None);
    }

    #[tokio::test]
    async fn test_removed_job_is_never_popped() {
        let q = queue();
        q.push(id("a"), Priority::NORMAL, None).await;
        q.push(id("b"), Priority::NORMAL, None).await;

        assert!(q.remove(&id("a")).await);
        assert!(!q.remove(&id("a")).await);
        assert_eq!(q.try_pop().await, Some(id("b")));
        assert_eq!(q.try_pop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_becomes_ready() {
        let q = queue();
        q.push(
            id("later"),
            Priority::NORMAL,
            Some(Instant::now() + Duration::from_secs(5)),
        )
        .await;

        assert_eq!(q.try_pop().await, None);
        assert_eq!(q.counts().await.delayed, 1);

        let popped = q.pop().await;
        assert_eq!(popped, id("later"));
        assert_eq!(q.counts().await.active, 1);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let q = std::sync::Arc::new(queue());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::task::yield_now().await;
        q.push(id("x"), Priority::NORMAL, None).await;
        assert_eq!(waiter.await.unwrap(), id("x"));
    }

    #[tokio::test]
    async fn test_retention_is_bounded() {
        let mut settings = LaneSettings::defaults(Lane::Low);
        settings.keep_completed = 2;
        let q = LaneQueue::new(Lane::Low, &settings);
        for name in ["a", "b", "c"] {
            q.record_completed(id(name)).await;
        }
        assert_eq!(q.counts().await.completed, 2);
    }

    #[tokio::test]
    async fn test_requeued_failure_leaves_failed_ring() {
        let q = queue();
        q.push(id("a"), Priority::NORMAL, None).await;
        q.try_pop().await;
        q.finish().await;
        q.record_failed(id("a")).await;
        assert_eq!(q.counts().await.failed, 1);

        q.push(id("a"), Priority::NORMAL, None).await;
        q.try_pop().await;
        q.finish().await;
        q.record_completed(id("a")).await;

        let counts = q.counts().await;
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn test_counts() {
        let q = queue();
        q.push(id("a"), Priority::NORMAL, None).await;
        q.push(
            id("b"),
            Priority::NORMAL,
            Some(Instant::now() + Duration::from_secs(60)),
        )
        .await;
        q.try_pop().await;

        let counts = q.counts().await;
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.active, 1);
        q.finish().await;
        assert_eq!(q.counts().await.active, 0);
    }
}
