//! # enrichq-entity
//!
//! Domain entity models for the enrichment queue. Every struct in this
//! crate is either a durable row (`Job`), an ephemeral snapshot
//! (`ProgressRecord`), or a value object carried inside a job payload.
//! All entities derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and
//! the durable row additionally derives `sqlx::FromRow`.

pub mod candidate;
pub mod job;
pub mod progress;

pub use candidate::{CandidateProfile, EnrichedContent, ExperienceEntry};
pub use job::{Job, JobId, JobPayload, JobStatus, JobType, JobUpdate, NewJob, Priority};
pub use progress::ProgressRecord;
