//! External collaborators: the enrichment service and the candidate directory.
//!
//! Handlers only see the traits; the HTTP clients are what the server
//! binary wires in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use enrichq_core::config::enrichment::EnrichmentConfig;
use enrichq_core::error::{AppError, ErrorKind};
use enrichq_core::result::AppResult;
use enrichq_entity::{CandidateProfile, EnrichedContent};

/// Opaque enrichment function with unbounded latency that may fail.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync + std::fmt::Debug {
    /// Enrich a candidate for a target role.
    async fn enrich(
        &self,
        candidate: &CandidateProfile,
        job_description: &str,
        client_name: Option<&str>,
    ) -> AppResult<EnrichedContent>;
}

/// Candidate lookup used by bulk jobs.
#[async_trait]
pub trait CandidateSource: Send + Sync + std::fmt::Debug {
    /// Find a candidate by id, `None` when it does not exist.
    async fn find_candidate(&self, id: &str) -> AppResult<Option<CandidateProfile>>;
}

fn build_client(timeout_seconds: u64) -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
        })
}

fn request_err(e: reqwest::Error) -> AppError {
    AppError::with_source(
        ErrorKind::ExternalService,
        format!("Enrichment request failed: {e}"),
        e,
    )
}

#[derive(Serialize)]
struct EnrichRequest<'a> {
    candidate: &'a CandidateProfile,
    job_description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_name: Option<&'a str>,
}

/// Calls `POST {base_url}/enrich`.
#[derive(Debug, Clone)]
pub struct HttpEnrichmentClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEnrichmentClient {
    /// Build a client from configuration.
    pub fn new(config: &EnrichmentConfig) -> AppResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentClient {
    async fn enrich(
        &self,
        candidate: &CandidateProfile,
        job_description: &str,
        client_name: Option<&str>,
    ) -> AppResult<EnrichedContent> {
        let url = format!("{}/enrich", self.base_url);
        let mut request = self.client.post(&url).json(&EnrichRequest {
            candidate,
            job_description,
            client_name,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(format!(
                "Enrichment service returned {status}"
            )));
        }

        debug!(candidate = %candidate.name, "Enrichment call succeeded");
        response.json::<EnrichedContent>().await.map_err(request_err)
    }
}

/// Calls `GET {candidates_url}/{id}`; a 404 means the candidate does not exist.
#[derive(Debug, Clone)]
pub struct HttpCandidateDirectory {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCandidateDirectory {
    /// Build a directory client from configuration.
    pub fn new(config: &EnrichmentConfig) -> AppResult<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            base_url: config.candidates_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateDirectory {
    async fn find_candidate(&self, id: &str) -> AppResult<Option<CandidateProfile>> {
        let url = format!("{}/{id}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(request_err)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CandidateProfile>()
                .await
                .map(Some)
                .map_err(request_err),
            status => Err(AppError::external_service(format!(
                "Candidate directory returned {status} for '{id}'"
            ))),
        }
    }
}
