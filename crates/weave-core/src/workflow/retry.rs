//! Retry policy for step execution.
//!
//! Stateless: the step runner asks the policy whether another attempt is
//! allowed and how long to back off before it. Delays grow as
//! `base * 2^attempt` and are capped at `max_delay`.

use std::time::Duration;

use weave_types::config::EngineConfig;
use weave_types::workflow::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for `step`, falling back to the engine defaults.
    pub fn for_step(step: &Step, config: &EngineConfig) -> Self {
        Self::new(
            step.retry_count.unwrap_or(config.default_retry_count),
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Backoff before the attempt after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self::new(
            config.default_retry_count,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(retry_count: Option<u32>) -> Step {
        serde_json::from_value(serde_json::json!({
            "id": "s",
            "name": "S",
            "agent": "a",
            "tool": "t",
            "retry_count": retry_count,
        }))
        .unwrap()
    }

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(50, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn for_step_uses_step_then_config() {
        let config = EngineConfig {
            default_retry_count: 4,
            backoff_base_ms: 250,
            ..EngineConfig::default()
        };
        assert_eq!(RetryPolicy::for_step(&step(Some(2)), &config).max_attempts, 2);

        let policy = RetryPolicy::for_step(&step(None), &config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
