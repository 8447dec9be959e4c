//! Single-candidate enhancement handlers: full profile, skills, and experience.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use enrichq_core::AppError;
use enrichq_entity::job::{RequestContext, TargetedEnhancementPayload};
use enrichq_entity::{
    CandidateProfile, EnrichedContent, ExperienceEntry, Job, JobPayload, JobType,
};

use super::{enrichment_failed, payload_mismatch};
use crate::enrichment::EnrichmentProvider;
use crate::executor::{JobExecutionError, JobHandler};
use crate::progress::JobContext;

#[derive(Debug, Serialize)]
struct EnhancedProfile<'a> {
    candidate_id: Option<&'a str>,
    original: &'a CandidateProfile,
    enriched_content: EnrichedContent,
    enhancement_types: &'a [String],
    client_name: Option<&'a str>,
    context: &'a RequestContext,
    enhanced_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct OptimizedSkills<'a> {
    candidate_id: Option<&'a str>,
    original_skills: &'a [String],
    optimized_skills: Vec<String>,
    context: &'a RequestContext,
    optimized_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct EnhancedExperience<'a> {
    candidate_id: Option<&'a str>,
    original_experience: &'a [ExperienceEntry],
    enhanced_experience: Vec<ExperienceEntry>,
    context: &'a RequestContext,
    enhanced_at: DateTime<Utc>,
}

fn candidate_id<'a>(explicit: &'a Option<String>, candidate: &'a CandidateProfile) -> Option<&'a str> {
    explicit.as_deref().or(candidate.id.as_deref())
}

/// Run one enrichment call between the 20% and 100% checkpoints.
async fn enrich_with_checkpoints(
    enrichment: &dyn EnrichmentProvider,
    ctx: &JobContext,
    candidate: &CandidateProfile,
    job_description: &str,
    client_name: Option<&str>,
    message: &str,
) -> Result<EnrichedContent, JobExecutionError> {
    let progress = ctx.progress();
    progress.report(20, message).await;
    progress
        .keep_alive(enrichment.enrich(candidate, job_description, client_name))
        .await
        .map_err(enrichment_failed)
}

/// Enhances a single candidate profile.
#[derive(Debug)]
pub struct ProfileEnhancementJobHandler {
    enrichment: Arc<dyn EnrichmentProvider>,
}

impl ProfileEnhancementJobHandler {
    /// Create a new profile enhancement handler.
    pub fn new(enrichment: Arc<dyn EnrichmentProvider>) -> Self {
        Self { enrichment }
    }
}

#[async_trait]
impl JobHandler for ProfileEnhancementJobHandler {
    fn job_type(&self) -> JobType {
        JobType::ProfileEnhancement
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let JobPayload::ProfileEnhancement(payload) = &job.payload else {
            return Err(payload_mismatch("profile enhancement"));
        };

        let enriched = enrich_with_checkpoints(
            self.enrichment.as_ref(),
            ctx,
            &payload.candidate,
            &payload.job_description,
            payload.client_name.as_deref(),
            "Enhancing candidate profile",
        )
        .await?;

        let result = serde_json::to_value(EnhancedProfile {
            candidate_id: candidate_id(&payload.candidate_id, &payload.candidate),
            original: &payload.candidate,
            enriched_content: enriched,
            enhancement_types: &payload.enhancement_types,
            client_name: payload.client_name.as_deref(),
            context: &payload.context,
            enhanced_at: Utc::now(),
        })
        .map_err(AppError::from)?;

        ctx.progress().report(100, "Profile enhanced").await;
        Ok(result)
    }
}

/// Rewrites a candidate's skills list for the target role.
#[derive(Debug)]
pub struct SkillsOptimizationJobHandler {
    enrichment: Arc<dyn EnrichmentProvider>,
}

impl SkillsOptimizationJobHandler {
    /// Create a new skills optimization handler.
    pub fn new(enrichment: Arc<dyn EnrichmentProvider>) -> Self {
        Self { enrichment }
    }
}

#[async_trait]
impl JobHandler for SkillsOptimizationJobHandler {
    fn job_type(&self) -> JobType {
        JobType::SkillsOptimization
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let JobPayload::SkillsOptimization(TargetedEnhancementPayload {
            candidate_id: explicit_id,
            candidate,
            job_description,
            client_name,
            context,
        }) = &job.payload
        else {
            return Err(payload_mismatch("skills optimization"));
        };

        let enriched = enrich_with_checkpoints(
            self.enrichment.as_ref(),
            ctx,
            candidate,
            job_description,
            client_name.as_deref(),
            "Optimizing skills",
        )
        .await?;

        let result = serde_json::to_value(OptimizedSkills {
            candidate_id: candidate_id(explicit_id, candidate),
            original_skills: &candidate.skills,
            optimized_skills: enriched.skills,
            context,
            optimized_at: Utc::now(),
        })
        .map_err(AppError::from)?;

        ctx.progress().report(100, "Skills optimized").await;
        Ok(result)
    }
}

/// Rewrites a candidate's experience entries for the target role.
#[derive(Debug)]
pub struct ExperienceEnhancementJobHandler {
    enrichment: Arc<dyn EnrichmentProvider>,
}

impl ExperienceEnhancementJobHandler {
    /// Create a new experience enhancement handler.
    pub fn new(enrichment: Arc<dyn EnrichmentProvider>) -> Self {
        Self { enrichment }
    }
}

#[async_trait]
impl JobHandler for ExperienceEnhancementJobHandler {
    fn job_type(&self) -> JobType {
        JobType::ExperienceEnhancement
    }

    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let JobPayload::ExperienceEnhancement(TargetedEnhancementPayload {
            candidate_id: explicit_id,
            candidate,
            job_description,
            client_name,
            context,
        }) = &job.payload
        else {
            return Err(payload_mismatch("experience enhancement"));
        };

        let enriched = enrich_with_checkpoints(
            self.enrichment.as_ref(),
            ctx,
            candidate,
            job_description,
            client_name.as_deref(),
            "Enhancing experience",
        )
        .await?;

        let result = serde_json::to_value(EnhancedExperience {
            candidate_id: candidate_id(explicit_id, candidate),
            original_experience: &candidate.experience,
            enhanced_experience: enriched.experience,
            context,
            enhanced_at: Utc::now(),
        })
        .map_err(AppError::from)?;

        ctx.progress().report(100, "Experience enhanced").await;
        Ok(result)
    }
}
