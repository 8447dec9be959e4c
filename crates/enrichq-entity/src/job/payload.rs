//! Typed job payload definitions.
//!
//! A payload is a sum type keyed by `type`; the variant decides which
//! handler runs, so dispatch is exhaustive at compile time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::candidate::CandidateProfile;

/// The closed set of job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Generate a tailored candidate document.
    DocumentGeneration,
    /// Enrich a single candidate profile.
    ProfileEnhancement,
    /// Enrich many candidates in batches.
    BulkEnrichment,
    /// Re-rank and rewrite a candidate's skills.
    SkillsOptimization,
    /// Rewrite a candidate's experience entries.
    ExperienceEnhancement,
}

impl JobType {
    /// Every job type.
    pub const ALL: [JobType; 5] = [
        Self::DocumentGeneration,
        Self::ProfileEnhancement,
        Self::BulkEnrichment,
        Self::SkillsOptimization,
        Self::ExperienceEnhancement,
    ];

    /// Return the job type as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentGeneration => "document_generation",
            Self::ProfileEnhancement => "profile_enhancement",
            Self::BulkEnrichment => "bulk_enrichment",
            Self::SkillsOptimization => "skills_optimization",
            Self::ExperienceEnhancement => "experience_enhancement",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller and session identifiers echoed into results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// User who requested the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Browser or API session the request came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form caller metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Output format requested for a generated document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// HTML document.
    #[default]
    Html,
    /// Markdown document.
    Markdown,
    /// PDF rendered from HTML downstream.
    Pdf,
}

/// Input for a document generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentGenerationPayload {
    /// Candidate to write about.
    pub candidate: CandidateProfile,
    /// Target job description.
    pub job_description: String,
    /// Client the document is prepared for.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Sections requested in the output.
    #[serde(default)]
    pub sections: Vec<String>,
    /// Output format.
    #[serde(default)]
    pub format: DocumentFormat,
    /// Caller identifiers.
    #[serde(default)]
    pub context: RequestContext,
}

/// Input for a single-candidate profile enhancement job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEnhancementPayload {
    /// Candidate id in the external directory, when known.
    #[serde(default)]
    pub candidate_id: Option<String>,
    /// Candidate data to enhance.
    pub candidate: CandidateProfile,
    /// Target job description.
    pub job_description: String,
    /// Client the enhancement is tailored for.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Requested enhancement kinds (e.g. `"summary"`, `"skills"`).
    #[serde(default)]
    pub enhancement_types: Vec<String>,
    /// Caller identifiers.
    #[serde(default)]
    pub context: RequestContext,
}

/// Input for a bulk enrichment job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEnrichmentPayload {
    /// Candidates to look up and enrich.
    pub candidate_ids: Vec<String>,
    /// Target job description.
    pub job_description: String,
    /// Client the enrichment is tailored for.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Items processed concurrently per batch (default 5).
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Caller identifiers.
    #[serde(default)]
    pub context: RequestContext,
}

/// Input shared by the skills and experience variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedEnhancementPayload {
    /// Candidate id in the external directory, when known.
    #[serde(default)]
    pub candidate_id: Option<String>,
    /// Candidate data to enhance.
    pub candidate: CandidateProfile,
    /// Target job description.
    pub job_description: String,
    /// Client the enhancement is tailored for.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Caller identifiers.
    #[serde(default)]
    pub context: RequestContext,
}

/// Typed payloads for every job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Generate a tailored document.
    DocumentGeneration(DocumentGenerationPayload),
    /// Enhance a single profile.
    ProfileEnhancement(ProfileEnhancementPayload),
    /// Enrich many candidates.
    BulkEnrichment(BulkEnrichmentPayload),
    /// Optimize the skills list.
    SkillsOptimization(TargetedEnhancementPayload),
    /// Enhance the experience list.
    ExperienceEnhancement(TargetedEnhancementPayload),
}

impl JobPayload {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            Self::DocumentGeneration(_) => JobType::DocumentGeneration,
            Self::ProfileEnhancement(_) => JobType::ProfileEnhancement,
            Self::BulkEnrichment(_) => JobType::BulkEnrichment,
            Self::SkillsOptimization(_) => JobType::SkillsOptimization,
            Self::ExperienceEnhancement(_) => JobType::ExperienceEnhancement,
        }
    }

    /// Caller identifiers carried by the payload.
    pub fn context(&self) -> &RequestContext {
        match self {
            Self::DocumentGeneration(p) => &p.context,
            Self::ProfileEnhancement(p) => &p.context,
            Self::BulkEnrichment(p) => &p.context,
            Self::SkillsOptimization(p) | Self::ExperienceEnhancement(p) => &p.context,
        }
    }
}
