//! Background enrichment job processing.
//!
//! This crate provides:
//! - Four priority lanes, each with its own worker pool and stall detector
//! - A per-lane dispatcher that applies lifecycle events and the retry policy
//! - A job executor that dispatches jobs to the handler for their type
//! - The built-in enrichment handlers and their external collaborators
//! - [`QueueService`], the admin API (enqueue, status, cancel, retry, stats, cleanup)
//! - A cron scheduler for retention cleanup

pub mod dispatcher;
pub mod enrichment;
pub mod events;
pub mod executor;
pub mod jobs;
pub mod lane;
pub mod progress;
pub mod queue;
pub mod retention;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod settings;

pub use events::JobEvent;
pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use lane::Lane;
pub use progress::{JobContext, ProgressReporter};
pub use scheduler::CronScheduler;
pub use service::{EnqueueOptions, QueueService};
pub use settings::QueueSettings;
