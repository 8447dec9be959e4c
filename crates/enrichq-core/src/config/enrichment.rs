//! External enrichment collaborator configuration.

use serde::{Deserialize, Serialize};

/// Endpoints for the enrichment service and the candidate directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Base URL of the enrichment service (`POST {base_url}/enrich`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Optional bearer token sent to the enrichment service.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds for a single enrichment call.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Base URL of the candidate directory (`GET {candidates_url}/{id}`).
    #[serde(default = "default_candidates_url")]
    pub candidates_url: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout(),
            candidates_url: default_candidates_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_candidates_url() -> String {
    "http://localhost:8080/api/candidates".to_string()
}
