//! Job executor: dispatches jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use enrichq_core::error::AppError;
use enrichq_entity::{Job, JobType};

use crate::progress::JobContext;

/// Trait for job handler implementations.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Run the job and return a serializable result.
    async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure; not retried automatically.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure; retried with backoff while budget remains.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// The job was cancelled while running.
    #[error("Job cancelled")]
    Cancelled,

    /// Internal error, treated as transient.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Whether the retry policy may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Internal(_))
    }

    /// Message recorded as the job's error.
    pub fn message(&self) -> String {
        match self {
            Self::Permanent(msg) | Self::Transient(msg) => msg.clone(),
            Self::Cancelled => "job cancelled".to_string(),
            Self::Internal(err) => err.to_string(),
        }
    }
}

/// Dispatches jobs to the handler registered for their type.
#[derive(Debug, Default)]
pub struct JobExecutor {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        tracing::info!(%job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Run a job with its handler.
    ///
    /// A missing handler is a programmer error and fails permanently.
    pub async fn execute(&self, job: &Job, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let handler = self.handlers.get(&job.job_type).ok_or_else(|| {
            JobExecutionError::Permanent(format!(
                "No handler registered for job type '{}'",
                job.job_type
            ))
        })?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = ctx.progress().attempt(),
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Executing job"
        );

        handler.execute(job, ctx).await
    }

    /// Check if a handler is registered for a job type.
    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Job types without a registered handler.
    pub fn missing_types(&self) -> Vec<JobType> {
        JobType::ALL
            .into_iter()
            .filter(|job_type| !self.has_handler(*job_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        fn job_type(&self) -> JobType {
            JobType::SkillsOptimization
        }

        async fn execute(&self, _job: &Job, _ctx: &JobContext) -> Result<Value, JobExecutionError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_missing_types() {
        let mut executor = JobExecutor::new();
        assert_eq!(executor.missing_types().len(), JobType::ALL.len());
        executor.register(Arc::new(Noop));
        assert!(executor.has_handler(JobType::SkillsOptimization));
        assert!(!executor.missing_types().contains(&JobType::SkillsOptimization));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(JobExecutionError::Transient("x".into()).is_retryable());
        assert!(JobExecutionError::Internal(AppError::internal("x")).is_retryable());
        assert!(!JobExecutionError::Permanent("x".into()).is_retryable());
        assert!(!JobExecutionError::Cancelled.is_retryable());
    }
}
