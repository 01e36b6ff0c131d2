//! Exponential-backoff policy for push-channel reconnection.
//!
//! After the channel closes with `n` consecutive failures on record, the
//! connection manager asks [`ReconnectConfig::decide`] what to do: wait
//! `min(initial * multiplier^n, max)` and retry, or give up once the
//! bound is reached.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failures after which reconnection stops.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

/// What to do after the channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// The failure bound was reached.
    GiveUp,
}

impl ReconnectConfig {
    /// Delay for the reconnect that follows `failures` consecutive failures.
    ///
    /// The result is clamped to [`ReconnectConfig::max_delay`].
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = self.multiplier.powi(failures.min(i32::MAX as u32) as i32);
        let ms = self.initial_delay.as_millis() as f64 * factor;
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(ms.min(max_ms) as u64)
    }

    pub fn decide(&self, failures: u32) -> ReconnectDecision {
        if failures >= self.max_attempts {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::Retry(self.delay_for(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_initial() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn delay_clamps_at_max() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(config.delay_for(4), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(2),
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(config.delay_for(1), Duration::from_secs(6));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = ReconnectConfig::default();
        for n in 0..10u32 {
            let expected = (1000u64 * 2u64.pow(n)).min(30_000);
            assert_eq!(
                config.decide(n),
                ReconnectDecision::Retry(Duration::from_millis(expected)),
                "failure count {n}"
            );
        }
    }

    #[test]
    fn tenth_failure_gives_up() {
        let config = ReconnectConfig::default();
        assert_eq!(config.decide(10), ReconnectDecision::GiveUp);
        assert_eq!(config.decide(11), ReconnectDecision::GiveUp);
    }

    #[test]
    fn huge_failure_count_does_not_overflow() {
        let config = ReconnectConfig {
            max_attempts: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.delay_for(5_000), Duration::from_secs(30));
    }
}
