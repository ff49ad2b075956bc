use rand::Rng;
use std::time::Duration;

use crate::config::ProbeConfig;

/// Exponential backoff with jitter, used to space out probes after the
/// generation API answers 429.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.backoff_initial_ms),
            max_delay: Duration::from_millis(cfg.backoff_max_ms),
            jitter_factor: cfg.jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay before the next attempt after `attempts` consecutive failures
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range((1.0 - self.jitter_factor)..=(1.0 + self.jitter_factor))
        } else {
            1.0
        };
        let delay = Duration::from_millis((base.as_millis() as f64 * jitter) as u64);

        // Cap the delay to prevent excessive waiting
        std::cmp::min(delay, self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter_factor: jitter,
        }
    }

    #[test]
    fn test_delay_doubles_without_jitter() {
        let p = policy(0.0);
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy(0.0);
        assert_eq!(p.delay(10), Duration::from_millis(1_000));
        assert_eq!(p.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let p = policy(0.2);
        for _ in 0..50 {
            let d = p.delay(2);
            assert!(d >= Duration::from_millis(160) && d <= Duration::from_millis(240));
        }
    }
}
