//! Background enrichment job entities.

pub mod model;
pub mod payload;
pub mod status;
pub mod update;

pub use model::{Job, JobId, NewJob};
pub use payload::{
    BulkEnrichmentPayload, DocumentFormat, DocumentGenerationPayload, JobPayload, JobType,
    ProfileEnhancementPayload, RequestContext, TargetedEnhancementPayload,
};
pub use status::{JobStatus, Priority};
pub use update::JobUpdate;
