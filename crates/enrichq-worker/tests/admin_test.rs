//! Integration tests for cancel, cleanup, recovery, and start-up checks.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use enrichq_cache::{CacheManager, ProgressChannel};
use enrichq_core::config::cache::CacheConfig;
use enrichq_core::error::ErrorKind;
use enrichq_database::{JobStore, MemoryJobStore};
use enrichq_entity::{
    Job, JobId, JobPayload, JobStatus, JobUpdate, NewJob, Priority, ProgressRecord,
};
use enrichq_worker::runner::STALLED_LIMIT_MESSAGE;
use enrichq_worker::{EnqueueOptions, JobExecutor, QueueService, QueueSettings};

use helpers::{FakeEnrichment, TestQueue, TestQueueBuilder};

#[tokio::test]
async fn test_cancel_pending_job_is_never_dispatched() {
    let queue = TestQueueBuilder::new().build().await;

    let job_id = queue
        .service
        .enqueue(helpers::document_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    assert!(queue.service.cancel(&job_id).await.unwrap());

    queue.service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(view.started_at.is_none());
    assert_eq!(queue.enrichment.calls(), 0);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_rejects_out_of_range_delay() {
    let queue = TestQueueBuilder::new().build().await;

    let err = queue
        .service
        .enqueue(
            helpers::document_payload(),
            EnqueueOptions {
                delay: Some(Duration::MAX),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(queue.store.is_empty());
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let queue = TestQueueBuilder::new().build().await;

    let job_id = queue
        .service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();

    assert!(queue.service.cancel(&job_id).await.unwrap());
    assert!(!queue.service.cancel(&job_id).await.unwrap());
    assert!(!queue.service.cancel(&job_id).await.unwrap());

    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);

    let unknown = JobId::from("skills_optimization_0_missing");
    assert!(!queue.service.cancel(&unknown).await.unwrap());
    assert!(queue.service.get_status(&unknown).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_in_flight_bulk_job_wins() {
    let queue = TestQueueBuilder::new()
        .enrichment(FakeEnrichment::new(Duration::from_millis(100)))
        .build()
        .await;
    queue.service.start().await.unwrap();

    let ids = ["a", "b", "c", "d", "e"];
    let job_id = queue
        .service
        .enqueue(helpers::bulk_payload(&ids, Some(1)), EnqueueOptions::default())
        .await
        .unwrap();

    queue.wait_for(&job_id, JobStatus::InProgress).await;
    assert!(!queue.service.cancel(&job_id).await.unwrap());

    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);

    // The handler stops at the next batch boundary; its outcome is discarded.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(view.result.is_none());
    assert!(queue.enrichment.calls() < ids.len() as u32);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_cancel_retry_scheduled_job() {
    let queue = TestQueueBuilder::new()
        .enrichment(FakeEnrichment::failing(u32::MAX, Duration::ZERO))
        .settings(|settings| settings.base_backoff = Duration::from_secs(30))
        .build()
        .await;
    queue.service.start().await.unwrap();

    let job_id = queue
        .service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();

    queue.wait_for(&job_id, JobStatus::RetryScheduled).await;
    assert!(queue.service.cancel(&job_id).await.unwrap());
    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_cleanup_removes_only_terminal_jobs() {
    let queue = TestQueueBuilder::new().build().await;
    let service = &queue.service;

    let pending = service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let cancelled = service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let completed = service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let running = service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();

    service.cancel(&cancelled).await.unwrap();
    queue
        .store
        .update(&completed, &JobUpdate::in_progress(Utc::now()))
        .await
        .unwrap();
    queue
        .store
        .update(
            &completed,
            &JobUpdate::completed(serde_json::json!({"ok": true}), Utc::now()),
        )
        .await
        .unwrap();
    queue
        .store
        .update(&running, &JobUpdate::in_progress(Utc::now()))
        .await
        .unwrap();
    queue
        .progress
        .publish(&ProgressRecord::new(completed.clone(), 1, 100, "done"))
        .await
        .unwrap();

    // Nothing is old enough yet.
    let report = service.cleanup(7).await.unwrap();
    assert_eq!(report.deleted_jobs, 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = service.cleanup(0).await.unwrap();
    assert_eq!(report.deleted_jobs, 2);
    assert_eq!(report.deleted_progress, 1);

    assert!(service.get_status(&cancelled).await.unwrap().is_none());
    assert!(service.get_status(&completed).await.unwrap().is_none());
    assert!(queue.progress.latest(&completed).await.unwrap().is_none());
    assert_eq!(
        service.get_status(&pending).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(
        service.get_status(&running).await.unwrap().unwrap().status,
        JobStatus::InProgress
    );
}

fn stored_job(priority: Priority) -> Job {
    Job::from_new(
        NewJob {
            id: None,
            payload: helpers::skills_payload(),
            priority,
            max_retries: 3,
            run_at: None,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn test_start_recovers_unfinished_jobs() {
    let store = Arc::new(MemoryJobStore::new());

    let pending = stored_job(Priority::NORMAL);
    store.create(&pending).await.unwrap();

    let interrupted = stored_job(Priority::HIGH);
    store.create(&interrupted).await.unwrap();
    store
        .update(&interrupted.id, &JobUpdate::in_progress(Utc::now()))
        .await
        .unwrap();

    let finished = stored_job(Priority::LOW);
    store.create(&finished).await.unwrap();
    store.update(&finished.id, &JobUpdate::cancelled()).await.unwrap();

    let queue = TestQueueBuilder::new().store(Arc::clone(&store)).build().await;
    queue.service.start().await.unwrap();

    let view = queue.wait_for(&pending.id, JobStatus::Completed).await;
    assert_eq!(view.retry_count, 0);

    let view = queue.wait_for(&interrupted.id, JobStatus::Completed).await;
    assert_eq!(view.retry_count, 1);
    assert!(view.last_error.unwrap().starts_with(STALLED_LIMIT_MESSAGE));

    let view = queue.service.get_status(&finished.id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert_eq!(queue.enrichment.calls(), 2);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_start_requires_every_handler() {
    let cache = CacheManager::new(&CacheConfig::default()).await.unwrap();
    let service = QueueService::new(
        Arc::new(MemoryJobStore::new()),
        ProgressChannel::new(cache.provider(), Duration::from_secs(60)),
        JobExecutor::new(),
        QueueSettings::default(),
    );

    let err = service.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);

    let payload: JobPayload = helpers::skills_payload();
    let err = service
        .enqueue(payload, EnqueueOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
}

#[tokio::test]
async fn test_shutdown_is_repeatable() {
    let queue = TestQueue::started().await;
    queue.service.shutdown().await;
    queue.service.shutdown().await;
}
