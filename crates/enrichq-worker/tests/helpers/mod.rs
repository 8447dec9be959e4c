//! Shared test helpers for queue integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use enrichq_cache::{CacheManager, ProgressChannel};
use enrichq_core::config::cache::CacheConfig;
use enrichq_core::error::AppError;
use enrichq_core::result::AppResult;
use enrichq_database::MemoryJobStore;
use enrichq_entity::job::{
    BulkEnrichmentPayload, DocumentGenerationPayload, DocumentFormat, ProfileEnhancementPayload,
    TargetedEnhancementPayload,
};
use enrichq_entity::{CandidateProfile, EnrichedContent, JobId, JobPayload, JobStatus};
use enrichq_worker::enrichment::{CandidateSource, EnrichmentProvider};
use enrichq_worker::jobs::register_default_handlers;
use enrichq_worker::service::JobStatusView;
use enrichq_worker::{JobEvent, JobExecutor, Lane, QueueService, QueueSettings};

/// Enrichment fake that fails a scripted number of times before succeeding.
#[derive(Debug, Default)]
pub struct FakeEnrichment {
    failures_remaining: AtomicU32,
    calls: AtomicU32,
    latency: Duration,
}

impl FakeEnrichment {
    /// Always succeeds after `latency`.
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fails the first `failures` calls.
    pub fn failing(failures: u32, latency: Duration) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            latency,
            ..Self::default()
        }
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentProvider for FakeEnrichment {
    async fn enrich(
        &self,
        candidate: &CandidateProfile,
        job_description: &str,
        _client_name: Option<&str>,
    ) -> AppResult<EnrichedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::external_service("enrichment service unavailable"));
        }

        Ok(EnrichedContent {
            summary: Some(format!("{} for {job_description}", candidate.name)),
            skills: candidate
                .skills
                .iter()
                .map(|skill| skill.to_uppercase())
                .collect(),
            highlights: vec![format!("Strong fit: {}", candidate.name)],
            ..EnrichedContent::default()
        })
    }
}

/// Candidate directory fake where listed ids do not exist.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    missing: HashSet<String>,
}

impl FakeDirectory {
    /// A directory where every id except `missing` resolves.
    pub fn without(missing: &[&str]) -> Self {
        Self {
            missing: missing.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CandidateSource for FakeDirectory {
    async fn find_candidate(&self, id: &str) -> AppResult<Option<CandidateProfile>> {
        if self.missing.contains(id) {
            return Ok(None);
        }
        Ok(Some(CandidateProfile {
            id: Some(id.to_string()),
            name: format!("Candidate {id}"),
            skills: vec!["rust".into()],
            ..CandidateProfile::default()
        }))
    }
}

/// A queue service over in-memory collaborators.
pub struct TestQueue {
    pub service: Arc<QueueService>,
    pub store: Arc<MemoryJobStore>,
    pub progress: ProgressChannel,
    pub enrichment: Arc<FakeEnrichment>,
}

/// Settings with short backoff and stall intervals.
pub fn fast_settings() -> QueueSettings {
    let mut settings = QueueSettings::default();
    settings.base_backoff = Duration::from_millis(20);
    settings.job_timeout = None;
    settings.shutdown_grace = Duration::from_secs(2);
    for lane in Lane::ALL {
        settings.lane_mut(lane).stall_interval = Duration::from_millis(500);
    }
    settings
}

pub struct TestQueueBuilder {
    store: Arc<MemoryJobStore>,
    enrichment: Arc<FakeEnrichment>,
    directory: Arc<FakeDirectory>,
    settings: QueueSettings,
    customize: Option<Box<dyn FnOnce(&mut JobExecutor)>>,
}

impl TestQueueBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryJobStore::new()),
            enrichment: Arc::new(FakeEnrichment::new(Duration::from_millis(10))),
            directory: Arc::new(FakeDirectory::default()),
            settings: fast_settings(),
            customize: None,
        }
    }

    pub fn store(mut self, store: Arc<MemoryJobStore>) -> Self {
        self.store = store;
        self
    }

    pub fn enrichment(mut self, enrichment: FakeEnrichment) -> Self {
        self.enrichment = Arc::new(enrichment);
        self
    }

    pub fn directory(mut self, directory: FakeDirectory) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    pub fn settings(mut self, f: impl FnOnce(&mut QueueSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    /// Register extra handlers after the built-in ones.
    pub fn handlers(mut self, f: impl FnOnce(&mut JobExecutor) + 'static) -> Self {
        self.customize = Some(Box::new(f));
        self
    }

    pub async fn build(self) -> TestQueue {
        let cache = CacheManager::new(&CacheConfig::default())
            .await
            .expect("memory cache");
        let progress = ProgressChannel::new(cache.provider(), Duration::from_secs(60));

        let mut executor = JobExecutor::new();
        register_default_handlers(&mut executor, self.enrichment.clone(), self.directory);
        if let Some(customize) = self.customize {
            customize(&mut executor);
        }

        let service = QueueService::new(
            self.store.clone(),
            progress.clone(),
            executor,
            self.settings,
        );

        TestQueue {
            service: Arc::new(service),
            store: self.store,
            progress,
            enrichment: self.enrichment,
        }
    }
}

impl TestQueue {
    /// Build and start a queue with default fakes.
    pub async fn started() -> Self {
        let queue = TestQueueBuilder::new().build().await;
        queue.service.start().await.expect("queue starts");
        queue
    }

    /// Poll until the job reaches `status`, panicking after five seconds.
    pub async fn wait_for(&self, job_id: &JobId, status: JobStatus) -> JobStatusView {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let view = self
                .service
                .get_status(job_id)
                .await
                .expect("status read")
                .expect("job exists");
            if view.status == status {
                return view;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "job {job_id} stuck in {} waiting for {status} (last_error: {:?})",
                    view.status, view.last_error
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Collect events for `job_id` until one satisfies `done`, panicking after five seconds.
pub async fn collect_until(
    rx: &mut broadcast::Receiver<JobEvent>,
    job_id: &JobId,
    done: impl Fn(&JobEvent) -> bool,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.job_id() == job_id => {
                    let finished = done(&event);
                    events.push(event);
                    if finished {
                        return;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await
    .expect("expected event within timeout");
    events
}

pub fn candidate(name: &str) -> CandidateProfile {
    CandidateProfile {
        name: name.into(),
        skills: vec!["rust".into(), "tokio".into()],
        ..CandidateProfile::default()
    }
}

pub fn document_payload() -> JobPayload {
    JobPayload::DocumentGeneration(DocumentGenerationPayload {
        candidate: candidate("Ada Lovelace"),
        job_description: "Principal engineer".into(),
        client_name: Some("Analytical Engines Ltd".into()),
        sections: vec!["summary".into(), "experience".into()],
        format: DocumentFormat::default(),
        context: Default::default(),
    })
}

pub fn profile_payload() -> JobPayload {
    JobPayload::ProfileEnhancement(ProfileEnhancementPayload {
        candidate_id: Some("cand-1".into()),
        candidate: candidate("Grace Hopper"),
        job_description: "Compiler engineer".into(),
        client_name: None,
        enhancement_types: vec!["summary".into(), "skills".into()],
        context: Default::default(),
    })
}

pub fn skills_payload() -> JobPayload {
    JobPayload::SkillsOptimization(targeted("Linus"))
}

pub fn experience_payload() -> JobPayload {
    JobPayload::ExperienceEnhancement(targeted("Barbara Liskov"))
}

fn targeted(name: &str) -> TargetedEnhancementPayload {
    TargetedEnhancementPayload {
        candidate_id: None,
        candidate: candidate(name),
        job_description: "Staff engineer".into(),
        client_name: None,
        context: Default::default(),
    }
}

pub fn bulk_payload(ids: &[&str], batch_size: Option<usize>) -> JobPayload {
    JobPayload::BulkEnrichment(BulkEnrichmentPayload {
        candidate_ids: ids.iter().map(|id| id.to_string()).collect(),
        job_description: "Data engineer".into(),
        client_name: Some("Acme".into()),
        batch_size,
        context: Default::default(),
    })
}
