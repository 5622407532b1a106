//! Connection acquisition with bounded exponential backoff.
//!
//! The pool is built once and handed in; only the liveness check is retried.
//! When every attempt fails the pool is closed before the error is returned.

use chrono::{SecondsFormat, Utc};

use crate::backoff::{BackoffConfig, ExponentialBackoff};
use crate::error::{ProbeError, Result};
use crate::probe::ProbePool;

/// Retry schedule for connection validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub const DEFAULT: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        base_delay_ms: 2_000,
        backoff_factor: 1.5,
    };

    /// Delays slept between attempts: `base * factor^(n-1)` after failure `n`.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::with_config(BackoffConfig {
            initial_delay_ms: self.base_delay_ms,
            multiplier: self.backoff_factor,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Validates a pool, retrying with backoff until it answers or attempts run out.
pub struct ConnectionAcquirer {
    policy: RetryPolicy,
}

impl ConnectionAcquirer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Return `pool` once a liveness check succeeds.
    ///
    /// Fails with [`ProbeError::Connection`] after `max_attempts` consecutive
    /// failures; no further attempt is made and the pool is closed.
    pub async fn acquire<P: ProbePool>(&self, pool: P) -> Result<P> {
        let max_attempts = self.policy.max_attempts;
        let mut backoff = self.policy.backoff();
        let mut attempt = 0;

        while attempt < max_attempts {
            match pool.ping().await {
                Ok(()) => {
                    tracing::info!(
                        attempt = attempt + 1,
                        connected_at = %Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                        "Database connection established"
                    );
                    return Ok(pool);
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        code = %e.code(),
                        error = %e,
                        "Connection attempt failed"
                    );

                    if attempt == max_attempts {
                        break;
                    }

                    let delay = backoff.next_delay();
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        next_attempt = attempt + 1,
                        "Retrying connection"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        pool.close().await;
        tracing::error!(max_attempts, "Exhausted connection attempts");
        Err(ProbeError::Connection { max_attempts })
    }
}

impl Default for ConnectionAcquirer {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
