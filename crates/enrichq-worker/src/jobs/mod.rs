//! Built-in enrichment job handlers.

pub mod bulk;
pub mod document;
pub mod profile;

use std::sync::Arc;

use enrichq_core::error::AppError;

use crate::enrichment::{CandidateSource, EnrichmentProvider};
use crate::executor::{JobExecutionError, JobExecutor};

pub use bulk::BulkEnrichmentJobHandler;
pub use document::DocumentGenerationJobHandler;
pub use profile::{
    ExperienceEnhancementJobHandler, ProfileEnhancementJobHandler, SkillsOptimizationJobHandler,
};

/// Register a handler for every job type.
pub fn register_default_handlers(
    executor: &mut JobExecutor,
    enrichment: Arc<dyn EnrichmentProvider>,
    candidates: Arc<dyn CandidateSource>,
) {
    executor.register(Arc::new(DocumentGenerationJobHandler::new(Arc::clone(
        &enrichment,
    ))));
    executor.register(Arc::new(ProfileEnhancementJobHandler::new(Arc::clone(
        &enrichment,
    ))));
    executor.register(Arc::new(SkillsOptimizationJobHandler::new(Arc::clone(
        &enrichment,
    ))));
    executor.register(Arc::new(ExperienceEnhancementJobHandler::new(Arc::clone(
        &enrichment,
    ))));
    executor.register(Arc::new(BulkEnrichmentJobHandler::new(enrichment, candidates)));
}

/// A failed enrichment call is worth retrying.
pub(crate) fn enrichment_failed(err: AppError) -> JobExecutionError {
    JobExecutionError::Transient(format!("Enrichment failed: {}", err.message))
}

/// The payload variant does not belong to the handler's job type.
pub(crate) fn payload_mismatch(expected: &str) -> JobExecutionError {
    JobExecutionError::Permanent(format!("Expected a {expected} payload"))
}
