//! Bounded exponential backoff shared by the fetcher and the publisher

use crate::clock::Clock;
use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Retry parameters for one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retry_count` (0-based), base 2, capped
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry_count));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts. Backoff sleeps go through `clock`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) => {
                if attempts >= max_attempts {
                    error!(operation, attempts, "giving up: {}", e);
                    return Err(e);
                }

                let delay = policy.backoff_duration(attempts - 1);
                warn!(
                    operation,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed: {}. Retrying...",
                    e
                );
                clock.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        };

        assert_eq!(policy.backoff_duration(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_duration(5), Duration::from_secs(32));
        assert_eq!(policy.backoff_duration(6), Duration::from_secs(60)); // capped
        assert_eq!(policy.backoff_duration(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_transient_until_exhausted() {
        let clock = ManualClock::new(Utc::now());
        let calls = AtomicU32::new(0);

        let result: std::result::Result<(), String> = retry_with_backoff(
            &RetryPolicy::default(),
            &clock,
            "test",
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let clock = ManualClock::new(Utc::now());
        let calls = AtomicU32::new(0);

        let result: std::result::Result<(), String> = retry_with_backoff(
            &RetryPolicy::default(),
            &clock,
            "test",
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("unauthorized".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err("unauthorized".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let clock = ManualClock::new(Utc::now());
        let calls = AtomicU32::new(0);

        let result: std::result::Result<u32, String> = retry_with_backoff(
            &RetryPolicy::default(),
            &clock,
            "test",
            |_| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("timeout".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }
}
