//! Retry logic with exponential backoff
//!
//! Page fetches that hit a transient failure (timeout, refused connection,
//! HTTP 429 or 5xx) are retried with exponential backoff and optional jitter.
//! Each attempt is an independent call through the request gate, so no permit
//! is held while waiting between attempts.
//!
//! # Example
//!
//! ```no_run
//! use wavy_history::retry::{IsRetryable, fetch_with_retry};
//! use wavy_history::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = fetch_with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            // Rate limited or server-side trouble
            Error::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            // The body arrived; asking again yields the same body
            Error::Decode { .. } => false,
            Error::PermitAcquisition { .. } => false,
            Error::PartialFanOut { .. } => false,
            Error::TotalTooLarge { .. } => false,
            Error::Cancelled => false,
            Error::Config { .. } => false,
            Error::InvalidUrl(_) => false,
            Error::TaskNotFound(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error once `max_attempts`
/// retries are used up or a non-retryable error occurs. Callers that want the
/// page or URL in the retry logs run this inside a span carrying it.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "Page request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        if retries >= config.max_attempts {
            tracing::debug!(
                error = %error,
                attempts = retries + 1,
                "Giving up on page request, retries exhausted"
            );
            return Err(error);
        }

        retries += 1;
        let wait = if config.jitter {
            add_jitter(delay)
        } else {
            delay
        };
        tracing::warn!(
            error = %error,
            retry = retries,
            max_attempts = config.max_attempts,
            wait_ms = wait.as_millis() as u64,
            "Transient page failure, retrying"
        );
        tokio::time::sleep(wait).await;

        delay = next_delay(config, delay);
    }
}

/// Grow `delay` by the backoff multiplier, never past `max_delay`.
///
/// A product too large for a `Duration` saturates at `max_delay`.
fn next_delay(config: &RetryConfig, delay: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(config.max_delay, |grown| grown.min(config.max_delay))
}

/// Jitter is uniform between 0% and 100% of the delay, so the result lies in
/// `[delay, 2 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn status(code: u16) -> Error {
        Error::HttpStatus {
            url: "http://wavy.test/profile/listens/u".into(),
            status: code,
        }
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&quick_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn test_retry_server_error_then_succeed() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&quick_config(3), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 { Err(status(503)) } else { Ok(7) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&quick_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(status(500))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::HttpStatus { status: 500, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3, "initial + 2 retries");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&quick_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(status(404))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_retry_calls_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let _ = fetch_with_retry(&RetryConfig::disabled(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(status(503))
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let start = std::time::Instant::now();

        let _ = fetch_with_retry(&quick_config(3), || async {
            Err::<i32, _>(status(502))
        })
        .await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "waited {:?}", elapsed);
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = quick_config(3);
        assert_eq!(
            next_delay(&config, Duration::from_millis(10)),
            Duration::from_millis(20)
        );
        assert_eq!(
            next_delay(&config, Duration::from_millis(800)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_next_delay_saturates_on_overflow() {
        let config = RetryConfig {
            backoff_multiplier: 1e300,
            max_delay: Duration::from_millis(5),
            ..quick_config(3)
        };
        assert_eq!(
            next_delay(&config, Duration::from_secs(1)),
            Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn test_huge_multiplier_still_returns_last_error() {
        let config = RetryConfig {
            backoff_multiplier: 1e300,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..quick_config(3)
        };
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            fetch_with_retry(&config, || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(status(503))
                }
            }),
        )
        .await
        .expect("retry loop should finish");

        assert!(matches!(result, Err(Error::HttpStatus { status: 503, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..20 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn test_classification() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(599).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(
            !Error::PermitAcquisition {
                waited: Duration::from_secs(1)
            }
            .is_retryable()
        );
        let decode = Error::Decode {
            url: "http://x".into(),
            source: serde_json::from_str::<serde_json::Value>("[").unwrap_err(),
        };
        assert!(!decode.is_retryable());
    }
}
