//! Retry logic with exponential backoff
//!
//! Transient fetch failures (timeouts, connection resets, 5xx answers) are
//! retried with exponentially growing, optionally jittered delays. Permanent
//! failures (404, malformed URL, permission denied) return immediately.
//! Every attempt runs under its own deadline; an attempt that overruns it
//! fails with a transient [`DownloadError::Timeout`].
//!
//! # Example
//!
//! ```no_run
//! use media_import::config::RetryConfig;
//! use media_import::error::DownloadError;
//! use media_import::retry::{IsRetryable, fetch_with_retry};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Busy,
//!     Gone,
//!     Slow,
//! }
//!
//! impl std::fmt::Display for FetchError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl From<DownloadError> for FetchError {
//!     fn from(_: DownloadError) -> Self {
//!         FetchError::Slow
//!     }
//! }
//!
//! impl IsRetryable for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         !matches!(self, FetchError::Gone)
//!     }
//! }
//!
//! # async fn example() -> Result<(), FetchError> {
//! let url = url::Url::parse("https://cdn.example.com/a.jpg").unwrap();
//! let config = RetryConfig::default();
//! fetch_with_retry(&config, &url, Duration::from_secs(30), || async {
//!     Ok::<_, FetchError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            DownloadError::Timeout { .. } => true,
            DownloadError::InvalidUrl { .. }
            | DownloadError::UnsupportedScheme { .. }
            | DownloadError::LocalFileUnavailable { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Download(e) => e.is_retryable(),
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            // Write-permission and disk-full failures are permanent
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Config { .. }
            | Error::Database(_)
            | Error::Storage(_)
            | Error::Serialization(_)
            | Error::InvalidBatch(_)
            | Error::Association(_)
            | Error::Other(_) => false,
        }
    }
}

/// Delay schedule between attempts
///
/// Starts at `initial_delay`, grows by `backoff_multiplier` and is capped at
/// `max_delay`. Jitter, when enabled, is applied to each yielded delay but not
/// carried into the next one.
pub(crate) struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    pub(crate) fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier).min(self.max);
        Some(if self.jitter { add_jitter(delay) } else { delay })
    }
}

/// Fetch `url` with `operation`, retrying transient failures
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times, each bounded by `attempt_timeout`. Returns the
/// first success or the last error.
pub async fn fetch_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    url: &url::Url,
    attempt_timeout: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display + From<DownloadError>,
{
    let mut delays = Backoff::new(config);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(attempt_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(E::from(DownloadError::Timeout {
                url: url.to_string(),
                seconds: attempt_timeout.as_secs_f64(),
            })),
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(url = %url, attempts = attempt, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::debug!(url = %url, error = %err, "Fetch failed permanently");
            return Err(err);
        }
        if attempt > config.max_attempts {
            tracing::error!(url = %url, error = %err, attempts = attempt, "Fetch failed, retries exhausted");
            return Err(err);
        }

        let delay = delays.next().unwrap_or(config.max_delay);
        tracing::warn!(
            url = %url,
            error = %err,
            attempt,
            max_retries = config.max_attempts,
            delay_ms = delay.as_millis(),
            "Fetch failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Random delay between `delay` and `2 * delay`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn cdn() -> url::Url {
        url::Url::parse("https://cdn.example.com/a.jpg").unwrap()
    }

    fn status(status: u16) -> Error {
        Error::Download(DownloadError::HttpStatus {
            url: "https://cdn.example.com/a.jpg".to_string(),
            status,
        })
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(
            !Error::Download(DownloadError::InvalidUrl {
                url: "::".to_string(),
                reason: "relative URL without a base".to_string(),
            })
            .is_retryable()
        );
    }

    #[test]
    fn io_classification() {
        let reset = Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        let denied = Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(reset.is_retryable());
        assert!(!denied.is_retryable(), "write permission failures fail fast");
    }

    #[test]
    fn timeouts_are_transient() {
        let err = Error::Download(DownloadError::Timeout {
            url: "https://cdn.example.com/a.jpg".to_string(),
            seconds: 1.0,
        });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn success_without_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&fast_config(3), &cdn(), Duration::from_secs(5), || {
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
    async fn transient_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&fast_config(3), &cdn(), Duration::from_secs(5), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 { Err(status(502)) } else { Ok(7) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&fast_config(2), &cdn(), Duration::from_secs(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(500))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&fast_config(5), &cdn(), Duration::from_secs(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(404))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::HttpStatus { status: 404, .. }))
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_grows_exponentially() {
        let start = std::time::Instant::now();

        let _ = fetch_with_retry(&fast_config(3), &cdn(), Duration::from_secs(5), || async {
            Err::<(), _>(status(503))
        })
        .await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(70),
            "should wait at least 70ms, waited {:?}",
            elapsed
        );
        assert!(elapsed < Duration::from_secs(2), "waited {:?}", elapsed);
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_is_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fetch_with_retry(&fast_config(1), &cdn(), Duration::from_millis(50), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok::<_, Error>(1)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_attempt_timing_out_reports_the_url() {
        let result = fetch_with_retry(&fast_config(1), &cdn(), Duration::from_millis(20), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        })
        .await;

        match result {
            Err(Error::Download(DownloadError::Timeout { url, .. })) => {
                assert_eq!(url, "https://cdn.example.com/a.jpg");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn backoff_schedule_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let delays: Vec<Duration> = Backoff::new(&config).take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let jittered = add_jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= base * 2);
        }
    }
}
