//! Candidate and enrichment value objects exchanged with the
//! external enrichment service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single role in a candidate's work history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    /// Role title.
    #[serde(default)]
    pub title: String,
    /// Employer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Start date as provided by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// End date, `None` for the current role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Bullet-point achievements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
}

/// Candidate data as stored by the recruitment application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    /// Directory id, when the profile came from a lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// One-line headline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    /// Profile summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Skills list.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Work history.
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    /// Fields the queue does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContent {
    /// Rewritten summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Optimized skills list.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Enhanced work history.
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    /// Selling points for the target role.
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Rendered document body, when the service produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Fields the queue does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
