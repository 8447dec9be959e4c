//! Priority lanes and their tuning.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use enrichq_core::config::queue::LaneConfig;
use enrichq_entity::Priority;

/// One of the four independent priority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Most urgent work.
    Critical,
    /// Elevated work.
    High,
    /// Catch-all default lane.
    Normal,
    /// Background work.
    Low,
}

impl Lane {
    /// Every lane, most urgent first.
    pub const ALL: [Lane; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Route a priority to its lane.
    ///
    /// `>= CRITICAL` and `>= HIGH` go to their lanes, `<= LOW` goes to the low
    /// lane, and everything else (including values strictly between LOW and
    /// NORMAL) falls through to normal.
    pub fn for_priority(priority: Priority) -> Self {
        if priority >= Priority::CRITICAL {
            Self::Critical
        } else if priority >= Priority::HIGH {
            Self::High
        } else if priority <= Priority::LOW {
            Self::Low
        } else {
            Self::Normal
        }
    }

    /// Position in [`Lane::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// Return the lane name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime tuning for a single lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneSettings {
    /// Jobs processed concurrently.
    pub concurrency: usize,
    /// Time without a heartbeat before a running job counts as stalled.
    pub stall_interval: Duration,
    /// Stalls tolerated before the job is failed.
    pub max_stalled_count: u32,
    /// Recently completed job ids remembered.
    pub keep_completed: usize,
    /// Recently failed job ids remembered.
    pub keep_failed: usize,
}

impl LaneSettings {
    /// Built-in tuning. Urgent lanes run more jobs and fail over faster.
    pub fn defaults(lane: Lane) -> Self {
        let (concurrency, stall_secs, max_stalled, keep_completed, keep_failed) = match lane {
            Lane::Critical => (5, 30, 1, 100, 200),
            Lane::High => (3, 45, 1, 50, 100),
            Lane::Normal => (2, 60, 2, 25, 50),
            Lane::Low => (1, 90, 3, 10, 25),
        };
        Self {
            concurrency,
            stall_interval: Duration::from_secs(stall_secs),
            max_stalled_count: max_stalled,
            keep_completed,
            keep_failed,
        }
    }

    /// Apply configured overrides on top of these settings.
    pub fn with_overrides(mut self, overrides: &LaneConfig) -> Self {
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency.max(1);
        }
        if let Some(secs) = overrides.stall_interval_seconds {
            self.stall_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(count) = overrides.max_stalled_count {
            self.max_stalled_count = count;
        }
        if let Some(keep) = overrides.keep_completed {
            self.keep_completed = keep;
        }
        if let Some(keep) = overrides.keep_failed {
            self.keep_failed = keep;
        }
        self
    }
}
