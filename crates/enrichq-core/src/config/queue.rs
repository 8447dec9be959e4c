//! Queue, lane, and retry configuration.

use serde::{Deserialize, Serialize};

/// Background queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Whether lane workers are started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Retry budget for normal and low priority jobs.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,
    /// Retry budget for high and critical priority jobs.
    #[serde(default = "default_elevated_max_retries")]
    pub elevated_max_retries: i32,
    /// Hard wall-clock ceiling per attempt in seconds (`0` disables it).
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Seconds to wait for in-flight jobs on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Cron expression for the scheduled cleanup.
    #[serde(default = "default_cleanup_cron")]
    pub cleanup_cron: String,
    /// Retention in days applied by the scheduled cleanup.
    #[serde(default = "default_retention_days")]
    pub cleanup_retention_days: u32,
    /// Per-lane overrides.
    #[serde(default)]
    pub lanes: LanesConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_backoff_ms: default_base_backoff(),
            default_max_retries: default_max_retries(),
            elevated_max_retries: default_elevated_max_retries(),
            job_timeout_seconds: default_job_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
            cleanup_cron: default_cleanup_cron(),
            cleanup_retention_days: default_retention_days(),
            lanes: LanesConfig::default(),
        }
    }
}

/// Overrides for each of the four lanes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanesConfig {
    /// Critical lane overrides.
    #[serde(default)]
    pub critical: LaneConfig,
    /// High lane overrides.
    #[serde(default)]
    pub high: LaneConfig,
    /// Normal lane overrides.
    #[serde(default)]
    pub normal: LaneConfig,
    /// Low lane overrides.
    #[serde(default)]
    pub low: LaneConfig,
}

/// Optional tuning for a single lane. Unset fields keep the lane's built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Number of jobs processed concurrently.
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Seconds without a heartbeat before a job counts as stalled.
    #[serde(default)]
    pub stall_interval_seconds: Option<u64>,
    /// Stalls tolerated before the job is failed.
    #[serde(default)]
    pub max_stalled_count: Option<u32>,
    /// Recently completed job ids remembered by the lane.
    #[serde(default)]
    pub keep_completed: Option<usize>,
    /// Recently failed job ids remembered by the lane.
    #[serde(default)]
    pub keep_failed: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_base_backoff() -> u64 {
    2000
}

fn default_max_retries() -> i32 {
    3
}

fn default_elevated_max_retries() -> i32 {
    5
}

fn default_job_timeout() -> u64 {
    1800
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_cleanup_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_retention_days() -> u32 {
    7
}
