//! Bulk enrichment job handler.
//!
//! Candidates are processed in fixed-size batches; items within a batch
//! run concurrently. A missing candidate or a failed enrichment becomes an
//! error entry in the results, never a job failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing;

use enrichq_core::AppError;
use enrichq_entity::job::RequestContext;
use enrichq_entity::{EnrichedContent, Job, JobPayload, JobType};

use super::payload_mismatch;
use crate::enrichment::{CandidateSource, EnrichmentProvider};
use crate::executor::{JobExecutionError, JobHandler};
use crate::progress::JobContext;

/// Batch size when the payload does not set one.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Outcome for a single candidate.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    /// Candidate id from the payload.
    pub candidate_id: String,
    /// Whether enrichment succeeded.
    pub success: bool,
    /// Enriched content on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_content: Option<EnrichedContent>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BulkSummary<'a> {
    total_processed: usize,
    successful: usize,
    failed: usize,
    batches: usize,
    results: Vec<BulkItemResult>,
    client_name: Option<&'a str>,
    context: &'a RequestContext,
    completed_at: DateTime<Utc>,
}

/// Enriches many candidates looked up from the candidate directory.
#[derive(Debug)]
pub struct BulkEnrichmentJobHandler {
    enrichment: Arc<dyn EnrichmentProvider>,
    candidates: Arc<dyn CandidateSource>,
}

impl BulkEnrichmentJobHandler {
    /// Create a new bulk enrichment handler.
    pub fn new(
        enrichment: Arc<dyn EnrichmentProvider>,
        candidates: Arc<dyn CandidateSource>,
    ) -> Self {
        Self {
            enrichment,
            candidates,
        }
    }

    async fn enrich_one(
        &self,
        candidate_id: &str,
        job_description: &str,
        client_name: Option<&str>,
    ) -> BulkItemResult {
        let outcome = match self.candidates.find_candidate(candidate_id).await {
            Ok(Some(candidate)) => self
                .enrichment
                .enrich(&candidate, job_description, client_name)
                .await
                .map_err(|e| e.message),
            Ok(None) => Err(format!("Candidate '{candidate_id}' not found")),
            Err(e) => Err(format!("Candidate lookup failed: {}", e.message)),
        };

        match outcome {
            Ok(enriched) => BulkItemResult {
                candidate_id: candidate_id.to_string(),
                success: true,
                enriched_content: Some(enriched),
                error: None,
            },
            Err(error) => {
                tracing::warn!(candidate_id, %error, "Bulk item failed");
                BulkItemResult {
                    candidate_id: candidate_id.to_string(),
                    success: false,
                    enriched_content: None,
                    error: Some(error),
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for BulkEnrichmentJobHandler {
    fn job_type(&self) -> JobType {
        JobType::BulkEnrichment
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let JobPayload::BulkEnrichment(payload) = &job.payload else {
            return Err(payload_mismatch("bulk enrichment"));
        };
        let progress = ctx.progress();
        let batch_size = payload.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let total = payload.candidate_ids.len();
        let batch_count = total.div_ceil(batch_size);
        let client_name = payload.client_name.as_deref();

        progress
            .report_items(0, total as u64, format!("Enriching {total} candidates"))
            .await;

        let mut results = Vec::with_capacity(total);
        for (index, batch) in payload.candidate_ids.chunks(batch_size).enumerate() {
            if ctx.is_cancelled() {
                tracing::info!(job_id = %job.id, batch = index + 1, "Bulk job cancelled between batches");
                return Err(JobExecutionError::Cancelled);
            }

            let batch_results = progress
                .keep_alive(join_all(batch.iter().map(|candidate_id| {
                    self.enrich_one(candidate_id, &payload.job_description, client_name)
                })))
                .await;
            results.extend(batch_results);

            progress
                .report_items(
                    results.len() as u64,
                    total as u64,
                    format!("Processed batch {}/{batch_count}", index + 1),
                )
                .await;
        }

        let successful = results.iter().filter(|item| item.success).count();
        let summary = BulkSummary {
            total_processed: results.len(),
            successful,
            failed: results.len() - successful,
            batches: batch_count,
            results,
            client_name,
            context: &payload.context,
            completed_at: Utc::now(),
        };

        tracing::info!(
            job_id = %job.id,
            total = summary.total_processed,
            successful = summary.successful,
            failed = summary.failed,
            "Bulk enrichment finished"
        );

        Ok(serde_json::to_value(summary).map_err(AppError::from)?)
    }
}
