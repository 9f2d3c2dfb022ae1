//! Bounded retries with per-attempt timeouts for payment oracle calls.

use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E> {
    /// The last attempt did not finish within the per-attempt timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    /// The last attempt failed.
    #[error("{0}")]
    Operation(E),
}

/// Runs an async operation up to `max_retries` times.
///
/// Every attempt is raced against `timeout_ms`. After a failed attempt `n` (counting from
/// zero) the service sleeps `base_delay_ms * 2^n`, plus up to half of that again when
/// jitter is enabled, before the next attempt.
#[derive(Debug, Clone, Default)]
pub struct RetryService {
    config: RetryConfig,
}

impl RetryService {
    pub fn new(config: RetryConfig) -> Self {
        RetryService { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.config.max_retries.max(1);
        let timeout = self.config.timeout();
        let mut last_error = RetryError::Timeout(timeout);

        for attempt in 0..attempts {
            match tokio::time::timeout(timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Attempt {} of {attempts} failed: {err}", attempt + 1);
                    last_error = RetryError::Operation(err);
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Attempt {} of {attempts} timed out", attempt + 1);
                    last_error = RetryError::Timeout(timeout);
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!("Giving up after {attempts} attempts: {last_error}");

        Err(last_error)
    }

    /// Delay slept after the failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let jitter = if self.config.jitter && delay > 0 {
            rand::random_range(0..=delay / 2)
        } else {
            0
        };
        Duration::from_millis(delay.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use tokio::time::Instant;

    use super::*;

    fn service(max_retries: u32, jitter: bool) -> RetryService {
        RetryService::new(
            RetryConfig::builder()
                .max_retries(max_retries)
                .base_delay_ms(100)
                .timeout_ms(1000)
                .jitter(jitter)
                .build(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = service(3, false)
            .retry(|| {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err("oracle unavailable"),
                        _ => Ok(42),
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = service(3, false)
            .retry(|| {
                let calls = calls.clone();
                async move { Err(format!("failure {}", calls.fetch_add(1, Ordering::SeqCst))) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Operation("failure 2".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_time_out() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), RetryError<String>> = service(2, false)
            .retry(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(RetryError::Timeout(Duration::from_millis(1000))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff() {
        let plain = service(5, false);
        assert_eq!(plain.backoff(0), Duration::from_millis(100));
        assert_eq!(plain.backoff(3), Duration::from_millis(800));

        let jittered = service(5, true);
        for attempt in 0..4 {
            let base = plain.backoff(attempt);
            let delay = jittered.backoff(attempt);
            assert!(delay >= base && delay <= base + base / 2);
        }
    }
}
