//! Exponential backoff for failed jobs.

use std::time::Duration;

use enrichq_entity::Job;

const MAX_EXPONENT: u32 = 16;

/// Upper bound on any single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Backoff retry policy: the n-th retry waits `2^n * base`, capped at
/// [`MAX_RETRY_DELAY`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
}

/// A retry the policy decided to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Retry count after this retry is consumed.
    pub retry_count: i32,
    /// Delay before the job becomes claimable again.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given base delay.
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay before the retry that follows `retry_count` earlier retries.
    pub fn delay_for(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.clamp(0, MAX_EXPONENT as i32) as u32;
        self.base
            .saturating_mul(2u32.pow(exponent))
            .min(MAX_RETRY_DELAY)
    }

    /// Decide whether a failed job gets another attempt.
    pub fn next(&self, job: &Job) -> Option<ScheduledRetry> {
        job.has_retries_left().then(|| ScheduledRetry {
            retry_count: job.retry_count + 1,
            delay: self.delay_for(job.retry_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(Duration::from_millis(2000));
        assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1));
        assert_eq!(policy.delay_for(100), policy.delay_for(16));
        assert_eq!(policy.delay_for(-3), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_base_is_clamped() {
        let policy = RetryPolicy::new(Duration::MAX);
        assert_eq!(policy.delay_for(0), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(16), MAX_RETRY_DELAY);
        assert!(std::time::Instant::now().checked_add(policy.delay_for(3)).is_some());
    }
}
