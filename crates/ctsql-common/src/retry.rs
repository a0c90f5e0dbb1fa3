use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BACKOFF_FACTOR: f64 = 2.0;

/// Bounded retry with randomized exponential backoff.
///
/// The delay before retry `n` (zero-based) is drawn uniformly from
/// `[min_delay, min(min_delay * 2^n, max_delay)]`.
///
/// # Examples
///
/// ```
/// use ctsql_common::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.attempts, 10);
/// let mut backoff = policy.backoff();
/// assert!(backoff.next_delay() <= policy.max_delay());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    10
}

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl RetryPolicy {
    /// A policy that retries `attempts` times without sleeping in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms))
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Stateful delay generator for one retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Returns the delay to wait before the next attempt and advances the
    /// exponent.
    pub fn next_delay(&mut self) -> Duration {
        let min = self.policy.min_delay().as_secs_f64();
        let max = self.policy.max_delay().as_secs_f64();
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let ceiling = (min * BACKOFF_FACTOR.powi(exponent)).min(max);
        self.attempt = self.attempt.saturating_add(1);

        if ceiling <= min {
            return Duration::from_secs_f64(min);
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=ceiling))
    }

    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let policy = RetryPolicy {
            attempts: 10,
            min_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let mut backoff = policy.backoff();
        for _ in 0..32 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(100), "{delay:?} below minimum");
            assert!(delay <= Duration::from_millis(1_000), "{delay:?} above maximum");
        }
        assert_eq!(backoff.attempt(), 32);
    }

    #[test]
    fn first_delay_is_the_minimum() {
        let policy = RetryPolicy {
            attempts: 3,
            min_delay_ms: 250,
            max_delay_ms: 10_000,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn ceiling_grows_until_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            min_delay_ms: 10,
            max_delay_ms: 40,
        };
        let mut backoff = policy.backoff();
        let _ = backoff.next_delay();
        // 10 * 2 = 20ms ceiling on the second draw
        assert!(backoff.next_delay() <= Duration::from_millis(20));
        for _ in 0..8 {
            assert!(backoff.next_delay() <= Duration::from_millis(40));
        }
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let mut backoff = RetryPolicy::immediate(10).backoff();
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn max_below_min_is_clamped() {
        let policy = RetryPolicy {
            attempts: 1,
            min_delay_ms: 500,
            max_delay_ms: 10,
        };
        assert_eq!(policy.max_delay(), Duration::from_millis(500));
        assert_eq!(policy.backoff().next_delay(), Duration::from_millis(500));
    }
}
