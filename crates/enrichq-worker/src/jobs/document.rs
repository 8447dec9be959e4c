//! Document generation job handler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing;

use enrichq_entity::job::{DocumentFormat, RequestContext};
use enrichq_entity::{EnrichedContent, Job, JobPayload, JobType};

use super::{enrichment_failed, payload_mismatch};
use crate::enrichment::EnrichmentProvider;
use crate::executor::{JobExecutionError, JobHandler};
use crate::progress::JobContext;

#[derive(Debug, Serialize)]
struct GeneratedDocument<'a> {
    enriched_content: EnrichedContent,
    candidate_id: Option<&'a str>,
    candidate_name: &'a str,
    job_description: &'a str,
    client_name: Option<&'a str>,
    sections: &'a [String],
    format: DocumentFormat,
    context: &'a RequestContext,
    generated_at: DateTime<Utc>,
}

/// Generates a tailored candidate document.
#[derive(Debug)]
pub struct DocumentGenerationJobHandler {
    enrichment: Arc<dyn EnrichmentProvider>,
}

impl DocumentGenerationJobHandler {
    /// Create a new document generation handler.
    pub fn new(enrichment: Arc<dyn EnrichmentProvider>) -> Self {
        Self { enrichment }
    }
}

#[async_trait]
impl JobHandler for DocumentGenerationJobHandler {
    fn job_type(&self) -> JobType {
        JobType::DocumentGeneration
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let JobPayload::DocumentGeneration(payload) = &job.payload else {
            return Err(payload_mismatch("document generation"));
        };
        let progress = ctx.progress();

        progress.report_stage(10, "starting", "Starting document generation").await;

        let enriched = progress
            .keep_alive(self.enrichment.enrich(
                &payload.candidate,
                &payload.job_description,
                payload.client_name.as_deref(),
            ))
            .await
            .map_err(enrichment_failed)?;

        progress.report_stage(80, "generating", "Generating document").await;

        let document = GeneratedDocument {
            enriched_content: enriched,
            candidate_id: payload.candidate.id.as_deref(),
            candidate_name: &payload.candidate.name,
            job_description: &payload.job_description,
            client_name: payload.client_name.as_deref(),
            sections: &payload.sections,
            format: payload.format,
            context: &payload.context,
            generated_at: Utc::now(),
        };
        let result = serde_json::to_value(&document).map_err(enrichq_core::AppError::from)?;

        progress.report_stage(100, "done", "Document generated").await;
        tracing::debug!(job_id = %job.id, "Document generated");

        Ok(result)
    }
}
