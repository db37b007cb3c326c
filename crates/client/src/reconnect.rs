//! Reconnection backoff policy
//!
//! Pure function of the attempt number: no clocks, no state.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// What to do after an unplanned close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Retry { delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// `attempt` is 1-based: the number of consecutive unplanned closes since
    /// the last successful handshake, including the one being handled.
    ///
    /// Delay is `min(base * 2^attempt, max_delay)`.
    pub fn next(&self, attempt: u32) -> Backoff {
        if attempt == 0 || attempt > self.max_attempts {
            return Backoff::GiveUp;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        Backoff::Retry { delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_ms(attempt: u32) -> u64 {
        (1000u64 * 2u64.pow(attempt)).min(10_000)
    }

    #[test]
    fn default_delays_double_then_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.next(1),
            Backoff::Retry {
                delay: Duration::from_millis(2_000)
            }
        );
        assert_eq!(
            policy.next(2),
            Backoff::Retry {
                delay: Duration::from_millis(4_000)
            }
        );
        assert_eq!(
            policy.next(3),
            Backoff::Retry {
                delay: Duration::from_millis(8_000)
            }
        );
    }

    #[test]
    fn gives_up_past_max_attempts() {
        let policy = ReconnectPolicy::default();
        for attempt in 4..64 {
            assert_eq!(policy.next(attempt), Backoff::GiveUp, "attempt {attempt}");
        }
        assert_eq!(policy.next(u32::MAX), Backoff::GiveUp);
    }

    #[test]
    fn attempt_zero_is_not_a_retry() {
        assert_eq!(ReconnectPolicy::default().next(0), Backoff::GiveUp);
    }

    #[test]
    fn delay_matches_formula_for_any_allowed_attempt() {
        let policy = ReconnectPolicy {
            max_attempts: 40,
            ..ReconnectPolicy::default()
        };
        for attempt in 1..=40 {
            match policy.next(attempt) {
                Backoff::Retry { delay } => {
                    assert_eq!(delay.as_millis() as u64, expected_ms(attempt), "attempt {attempt}");
                    assert!(delay <= policy.max_delay);
                }
                Backoff::GiveUp => panic!("attempt {attempt} should retry"),
            }
        }
    }

    #[test]
    fn policy_is_deterministic() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..10 {
            assert_eq!(policy.next(attempt), policy.next(attempt));
        }
    }
}
