//! Exponential backoff implementation for connection retries

use std::time::Duration;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier for exponential growth
    pub multiplier: f64,
}

/// Exponential backoff calculator.
///
/// The first call to [`next_delay`](Self::next_delay) yields the initial
/// delay; every following call grows it by the multiplier.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_delay_ms: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        let initial = config.initial_delay_ms as f64;
        Self {
            config,
            current_delay_ms: initial,
        }
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_ms.max(1.0);
        self.current_delay_ms *= self.config.multiplier;
        Duration::from_millis(delay.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_schedule() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig {
            initial_delay_ms: 2_000,
            multiplier: 1.5,
        });

        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![2000, 3000, 4500, 6750]);
    }

    #[test]
    fn test_zero_initial_delay_is_floored() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig {
            initial_delay_ms: 0,
            multiplier: 2.0,
        });

        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }
}
