//! Runtime queue settings derived from configuration.

use std::time::Duration;

use enrichq_core::config::queue::QueueConfig;
use enrichq_entity::Priority;

use crate::lane::{Lane, LaneSettings};

/// Resolved queue tuning, with durations instead of raw seconds.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Base delay for exponential backoff.
    pub base_backoff: Duration,
    /// Retry budget below HIGH priority.
    pub default_max_retries: i32,
    /// Retry budget at HIGH priority and above.
    pub elevated_max_retries: i32,
    /// Hard ceiling per handler run, `None` when disabled.
    pub job_timeout: Option<Duration>,
    /// Time allowed for in-flight jobs on shutdown.
    pub shutdown_grace: Duration,
    /// Tuning per lane, indexed by [`Lane::index`].
    pub lanes: [LaneSettings; 4],
}

impl QueueSettings {
    /// Resolve configuration into settings.
    pub fn from_config(config: &QueueConfig) -> Self {
        let overrides = &config.lanes;
        Self {
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            default_max_retries: config.default_max_retries.max(0),
            elevated_max_retries: config.elevated_max_retries.max(0),
            job_timeout: (config.job_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.job_timeout_seconds)),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
            lanes: [
                LaneSettings::defaults(Lane::Critical).with_overrides(&overrides.critical),
                LaneSettings::defaults(Lane::High).with_overrides(&overrides.high),
                LaneSettings::defaults(Lane::Normal).with_overrides(&overrides.normal),
                LaneSettings::defaults(Lane::Low).with_overrides(&overrides.low),
            ],
        }
    }

    /// Settings for one lane.
    pub fn lane(&self, lane: Lane) -> &LaneSettings {
        &self.lanes[lane.index()]
    }

    /// Mutable settings for one lane.
    pub fn lane_mut(&mut self, lane: Lane) -> &mut LaneSettings {
        &mut self.lanes[lane.index()]
    }

    /// Retry budget for a priority.
    pub fn max_retries_for(&self, priority: Priority) -> i32 {
        if priority.is_elevated() {
            self.elevated_max_retries
        } else {
            self.default_max_retries
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = QueueSettings::default();
        assert_eq!(settings.base_backoff, Duration::from_millis(2000));
        assert_eq!(settings.job_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(settings.lane(Lane::Critical).concurrency, 5);
        assert_eq!(settings.lane(Lane::Low).stall_interval, Duration::from_secs(90));
    }

    #[test]
    fn test_zero_timeout_disables_ceiling() {
        let config = QueueConfig {
            job_timeout_seconds: 0,
            ..QueueConfig::default()
        };
        assert_eq!(QueueSettings::from_config(&config).job_timeout, None);
    }

    #[test]
    fn test_elevated_priorities_get_larger_budget() {
        let settings = QueueSettings::default();
        assert_eq!(settings.max_retries_for(Priority::NORMAL), 3);
        assert_eq!(settings.max_retries_for(Priority::HIGH), 5);
        assert_eq!(settings.max_retries_for(Priority::CRITICAL), 5);
        assert_eq!(settings.max_retries_for(Priority(9)), 3);
    }
}
