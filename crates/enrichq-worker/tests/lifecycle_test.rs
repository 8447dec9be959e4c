//! Integration tests for the job lifecycle through the handlers.

mod helpers;

use std::time::Duration;

use enrichq_entity::{JobStatus, Priority};
use enrichq_worker::{EnqueueOptions, JobEvent, Lane};

use helpers::{FakeDirectory, TestQueue, TestQueueBuilder, collect_until};

#[tokio::test]
async fn test_document_generation_completes() {
    let queue = TestQueue::started().await;
    let mut events = queue.service.subscribe();

    let job_id = queue
        .service
        .enqueue(helpers::document_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    assert!(job_id.as_str().starts_with("document_generation_"));

    let view = queue.wait_for(&job_id, JobStatus::Completed).await;

    let result = view.result.expect("completed job has a result");
    assert!(view.error.is_none());
    assert_eq!(
        result["enriched_content"]["summary"],
        "Ada Lovelace for Principal engineer"
    );
    assert_eq!(result["candidate_name"], "Ada Lovelace");
    assert_eq!(result["client_name"], "Analytical Engines Ltd");
    assert!(result["generated_at"].is_string());

    let started_at = view.started_at.expect("started_at stamped");
    let completed_at = view.completed_at.expect("completed_at stamped");
    assert!(completed_at > started_at);
    assert!(started_at > view.created_at);

    let progress = view.progress.expect("final progress retained");
    assert_eq!(progress.percentage, 100);
    assert!(view.progress_age_ms.is_some());

    let seen = collect_until(&mut events, &job_id, JobEvent::is_final).await;
    assert!(matches!(seen.first(), Some(JobEvent::Enqueued { lane: Lane::Normal, .. })));
    assert!(seen.iter().any(|e| matches!(e, JobEvent::Started { attempt: 1, .. })));
    assert!(matches!(seen.last(), Some(JobEvent::Completed { .. })));

    let percentages: Vec<u8> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect();
    assert_eq!(percentages, vec![10, 80, 100]);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_profile_and_targeted_variants_complete() {
    let queue = TestQueue::started().await;

    let profile = queue
        .service
        .enqueue(helpers::profile_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let skills = queue
        .service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let experience = queue
        .service
        .enqueue(helpers::experience_payload(), EnqueueOptions::default())
        .await
        .unwrap();

    let profile = queue.wait_for(&profile, JobStatus::Completed).await;
    let result = profile.result.unwrap();
    assert_eq!(result["original"]["name"], "Grace Hopper");
    assert_eq!(
        result["enhancement_types"],
        serde_json::json!(["summary", "skills"])
    );

    let skills = queue.wait_for(&skills, JobStatus::Completed).await;
    let result = skills.result.unwrap();
    assert_eq!(result["original_skills"], serde_json::json!(["rust", "tokio"]));
    assert_eq!(result["optimized_skills"], serde_json::json!(["RUST", "TOKIO"]));
    assert!(result.get("enriched_content").is_none());

    let experience = queue.wait_for(&experience, JobStatus::Completed).await;
    let result = experience.result.unwrap();
    assert!(result.get("original_experience").is_some());
    assert!(result.get("enhanced_experience").is_some());

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_bulk_enrichment_records_missing_candidate() {
    let queue = TestQueueBuilder::new()
        .directory(FakeDirectory::without(&["c3"]))
        .build()
        .await;
    queue.service.start().await.unwrap();
    let mut events = queue.service.subscribe();

    let ids = ["c1", "c2", "c3", "c4", "c5", "c6", "c7"];
    let job_id = queue
        .service
        .enqueue(helpers::bulk_payload(&ids, Some(5)), EnqueueOptions::default())
        .await
        .unwrap();

    let view = queue.wait_for(&job_id, JobStatus::Completed).await;
    let result = view.result.unwrap();
    assert_eq!(result["total_processed"], 7);
    assert_eq!(result["successful"], 6);
    assert_eq!(result["failed"], 1);
    assert_eq!(result["batches"], 2);

    let items = result["results"].as_array().unwrap();
    assert_eq!(items.len(), 7);
    let missing = items
        .iter()
        .find(|item| item["candidate_id"] == "c3")
        .expect("missing candidate keeps an entry");
    assert_eq!(missing["success"], false);
    assert!(missing["error"].as_str().unwrap().contains("not found"));

    let seen = collect_until(&mut events, &job_id, JobEvent::is_final).await;
    let completed: Vec<u64> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { completed, .. } => *completed,
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![0, 5, 7]);

    let progress = view.progress.unwrap();
    assert_eq!(progress.completed, Some(7));
    assert_eq!(progress.total, Some(7));

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_bulk_with_no_successes_still_completes() {
    let queue = TestQueueBuilder::new()
        .directory(FakeDirectory::without(&["a", "b"]))
        .build()
        .await;
    queue.service.start().await.unwrap();

    let job_id = queue
        .service
        .enqueue(helpers::bulk_payload(&["a", "b"], None), EnqueueOptions::default())
        .await
        .unwrap();

    let view = queue.wait_for(&job_id, JobStatus::Completed).await;
    let result = view.result.unwrap();
    assert_eq!(result["successful"], 0);
    assert_eq!(result["failed"], 2);
    assert_eq!(queue.enrichment.calls(), 0);

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_priority_routing() {
    let queue = TestQueueBuilder::new().build().await;
    let service = &queue.service;

    let cases = [
        (Priority::CRITICAL, Lane::Critical),
        (Priority(50), Lane::Critical),
        (Priority::HIGH, Lane::High),
        (Priority(15), Lane::High),
        (Priority::NORMAL, Lane::Normal),
        (Priority(3), Lane::Normal),
        (Priority(7), Lane::Normal),
        (Priority::LOW, Lane::Low),
        (Priority(0), Lane::Low),
    ];

    for (priority, lane) in cases {
        let job_id = service
            .enqueue(helpers::skills_payload(), EnqueueOptions::with_priority(priority))
            .await
            .unwrap();
        let view = service.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(view.lane, lane, "priority {priority}");
        assert_eq!(view.status, JobStatus::Pending);
    }

    let stats = service.stats().await;
    assert_eq!(stats.lane(Lane::Critical).waiting, 2);
    assert_eq!(stats.lane(Lane::High).waiting, 2);
    assert_eq!(stats.lane(Lane::Normal).waiting, 3);
    assert_eq!(stats.lane(Lane::Low).waiting, 2);
    assert_eq!(stats.totals.waiting, 9);
}

#[tokio::test]
async fn test_elevated_priority_gets_larger_retry_budget() {
    let queue = TestQueueBuilder::new().build().await;

    let normal = queue
        .service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    let high = queue
        .service
        .enqueue(
            helpers::skills_payload(),
            EnqueueOptions::with_priority(Priority::HIGH),
        )
        .await
        .unwrap();

    let normal = queue.service.get_status(&normal).await.unwrap().unwrap();
    let high = queue.service.get_status(&high).await.unwrap().unwrap();
    assert_eq!(normal.max_retries, 3);
    assert_eq!(high.max_retries, 5);
}

#[tokio::test]
async fn test_delayed_job_waits_before_running() {
    let queue = TestQueue::started().await;

    let job_id = queue
        .service
        .enqueue(
            helpers::skills_payload(),
            EnqueueOptions {
                delay: Some(Duration::from_millis(300)),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap();

    let stats = queue.service.stats().await;
    assert_eq!(stats.lane(Lane::Normal).delayed, 1);
    let view = queue.service.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Pending);
    assert!(view.run_at.is_some());

    let view = queue.wait_for(&job_id, JobStatus::Completed).await;
    let waited = view.started_at.unwrap() - view.created_at;
    assert!(waited >= chrono::Duration::milliseconds(250));

    queue.service.shutdown().await;
}

#[tokio::test]
async fn test_stats_count_finished_jobs() {
    let queue = TestQueue::started().await;

    let job_id = queue
        .service
        .enqueue(helpers::skills_payload(), EnqueueOptions::default())
        .await
        .unwrap();
    queue.wait_for(&job_id, JobStatus::Completed).await;
    // Lane bookkeeping trails the store write.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = queue.service.stats().await;
    assert_eq!(stats.lane(Lane::Normal).completed, 1);
    assert_eq!(stats.totals.completed, 1);
    assert_eq!(stats.totals.active, 0);

    queue.service.shutdown().await;
}
