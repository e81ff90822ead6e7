//! Retry utilities: backoff builders for refresh conflicts and transient
//! store failures.
//!
//! Uses `backon` for exponential backoff with jitter. The delays come from
//! the `retry` configuration section so operators can tune them.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Backoff settings, deserialized from the `retry` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First retry delay, in milliseconds.
    pub min_delay_ms: u64,
    /// Delay cap, in milliseconds.
    pub max_delay_ms: u64,
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: usize,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 20,
            max_delay_ms: 1_000,
            max_retries: 5,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff built from these settings.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use backon::{BackoffBuilder, Retryable};

    use super::*;

    fn fast(max_retries: usize) -> RetryConfig {
        RetryConfig {
            min_delay_ms: 1,
            max_delay_ms: 2,
            max_retries,
            jitter: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.min_delay_ms, 20);
        assert_eq!(config.max_delay_ms, 1_000);
        assert_eq!(config.max_retries, 5);
        assert!(config.jitter);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = RetryConfig {
            min_delay_ms: 100,
            max_delay_ms: 500,
            max_retries: 5,
            jitter: false,
        };
        let delays: Vec<Duration> = config.backoff().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn test_no_retries_yields_no_delays() {
        assert_eq!(RetryConfig::none().backoff().build().count(), 0);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = (move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("attempt {n} failed"))
            } else {
                Ok(n)
            }
        })
        .retry(fast(5).backoff())
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = (move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("still failing".to_string())
        })
        .retry(fast(2).backoff())
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_filtered_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = (move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal".to_string())
        })
        .retry(fast(5).backoff())
        .when(|_| false)
        .await;

        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
