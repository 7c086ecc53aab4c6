//! Backoff strategies for the retry executor (spec §4.7).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries. Spec §4.7 names exactly these three.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Linear increase: `delay = initial_delay * attempt`.
    Linear,
    /// Exponential increase: `delay = initial_delay * base^(attempt-1)`.
    Exponential { base: f64 },
}

/// Backoff delay calculator.
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.calculate_base_delay(attempt);
        let capped_delay = base_delay.min(self.max_delay);

        if self.jitter {
            self.add_jitter(capped_delay)
        } else {
            capped_delay
        }
    }

    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay * attempt,
            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let multiplier = base.powi(attempt as i32 - 1);
                Duration::from_nanos((self.initial_delay.as_nanos() as f64 * multiplier) as u64)
            }
        }
    }

    /// Uniform jitter of ±25% of the computed delay, per spec §4.7.
    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let jitter_factor = rng.random_range(0.75..1.25);
        Duration::from_nanos((delay.as_nanos() as f64 * jitter_factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let calc = BackoffCalculator::new(BackoffStrategy::Fixed, Duration::from_millis(100), Duration::from_secs(1), false);
        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(10), Duration::from_millis(100));
    }

    #[test]
    fn linear_backoff_scales_and_caps() {
        let calc = BackoffCalculator::new(BackoffStrategy::Linear, Duration::from_millis(100), Duration::from_secs(1), false);
        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(5), Duration::from_millis(500));
        assert_eq!(calc.calculate_delay(20), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let calc = BackoffCalculator::new(
            BackoffStrategy::Exponential { base: 2.0 },
            Duration::from_millis(100),
            Duration::from_secs(10),
            false,
        );
        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(calc.calculate_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn jitter_stays_within_twenty_five_percent() {
        let calc = BackoffCalculator::new(BackoffStrategy::Fixed, Duration::from_millis(1000), Duration::from_secs(10), true);
        for _ in 0..200 {
            let delay = calc.calculate_delay(1);
            assert!(delay >= Duration::from_millis(750) && delay <= Duration::from_millis(1250));
        }
    }
}
