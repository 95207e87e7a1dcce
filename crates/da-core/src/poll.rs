//! Bounded poll schedule for work-item status checks.
//!
//! The delay before attempt n grows geometrically from the initial
//! interval and is capped at `max_interval_ms`. A fixed attempt budget
//! replaces the unbounded loop; exhaustion is classified as the
//! distinct `timeout` status by the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_interval_ms() -> u64 {
    2_000
}

fn default_max_interval_ms() -> u64 {
    30_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    300
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollPolicy {
    /// Delay to wait after the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = (self.multiplier.max(1) as u64).saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_interval_ms
            .saturating_mul(factor)
            .min(self.max_interval_ms);
        Duration::from_millis(ms)
    }

    /// True once `attempts_made` polls have been spent.
    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_up_to_cap() {
        let policy = PollPolicy {
            initial_interval_ms: 1_000,
            max_interval_ms: 8_000,
            multiplier: 2,
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(8_000));
    }

    #[test]
    fn multiplier_one_keeps_fixed_interval() {
        let policy = PollPolicy {
            initial_interval_ms: 2_000,
            max_interval_ms: 30_000,
            multiplier: 1,
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(7), Duration::from_millis(2_000));
    }

    #[test]
    fn exhaustion_at_max_attempts() {
        let policy = PollPolicy {
            max_attempts: 3,
            ..PollPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn large_attempt_numbers_saturate() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }
}
