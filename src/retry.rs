//! Retry policy for transport-level failures.
//!
//! Grounded on the teacher's `RetryConfig`/`retry_with_backoff`, with the
//! delay formula and retryability classification rebuilt: delay grows as
//! `min(maxDelay, initialDelay * multiplier^(attempt-1))` and jitter is
//! drawn uniformly from `[0.5 * delay, 1.5 * delay]` rather than added and
//! subtracted around the capped delay. A `Retry-After` header, when present
//! on a 429/503, is honored as a lower bound on the computed delay.

use crate::error::{Error, ErrorKind, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// HTTP status codes retried by default: rate limiting and the classic
/// transient server statuses.
pub const DEFAULT_RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. A value of `1`
    /// disables retries entirely.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier applied per additional attempt (e.g. `2.0` doubles).
    pub backoff_multiplier: f64,
    /// HTTP status codes considered transient and worth retrying.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    pub fn is_status_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// `delay = min(maxDelay, initialDelay * multiplier^(attempt-1))`,
    /// `attempt` is 1-based (the first retry is attempt 1). A
    /// `retry_after` floor, if given, becomes a lower bound on the
    /// uniformly jittered result.
    fn base_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = (attempt.saturating_sub(1)) as i32;
        let scaled = base_ms * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Jitter the base delay uniformly in `[0.5x, 1.5x]`, then apply the
    /// `Retry-After` floor if present.
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay(attempt);
        let base_ms = base.as_millis() as f64;
        let jittered_ms = rand::random::<f64>() * base_ms + 0.5 * base_ms;
        let jittered = Duration::from_millis(jittered_ms.max(0.0) as u64);
        match retry_after {
            Some(floor) if floor > jittered => floor,
            _ => jittered,
        }
    }
}

/// Classification of a failed attempt: retryable (with an optional
/// `Retry-After` floor) or fatal.
enum Attempt {
    Retryable(Error, Option<Duration>),
    Fatal(Error),
}

fn classify(config: &RetryConfig, err: Error) -> Attempt {
    if is_retryable(config, &err) {
        let retry_after = retry_after_of(&err);
        Attempt::Retryable(err, retry_after)
    } else {
        Attempt::Fatal(err)
    }
}

/// Extract an HTTP status code from an error's message, when the cause was
/// an HTTP response. The Responder attaches this via `Error::with_cause`
/// carrying a `reqwest::Error`; we look for the status reqwest embeds.
fn status_code_of(err: &Error) -> Option<u16> {
    err.cause
        .as_ref()
        .and_then(|cause| cause.downcast_ref::<reqwest::Error>())
        .and_then(|e| e.status())
        .map(|s| s.as_u16())
}

/// `Retry-After` is carried as a message suffix by the Responder
/// (`retry_after_secs=N`) because `reqwest::Error` does not expose response
/// headers once consumed. Absent that marker, there is no floor.
fn retry_after_of(err: &Error) -> Option<Duration> {
    err.message
        .rsplit_once("retry_after_secs=")
        .and_then(|(_, secs)| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Retry an async operation, stopping as soon as an error's `ErrorKind`
/// is not retryable at the transport layer. `operation` receives the
/// 1-based attempt number, so callers can attribute telemetry to the
/// right attempt without maintaining their own counter.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 1..=config.max_attempts.max(1) {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => match classify(&config, err) {
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retryable(err, retry_after) => {
                    let is_last = attempt == config.max_attempts.max(1);
                    if is_last {
                        return Err(err);
                    }
                    let delay = config.calculate_delay(attempt, retry_after);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, kind = %err.kind, "retrying after transient failure");
                    last_error = Some(err);
                    sleep(delay).await;
                }
            },
        }
    }

    Err(last_error.unwrap_or_else(|| Error::new(ErrorKind::Server, "retry loop exited with no error recorded")))
}

/// Whether an error, if encountered by a live transport call, would be
/// worth retrying under `config`. Exposed for callers that want to decide
/// without going through `retry_with_backoff` (e.g. streaming, where a
/// mid-stream disconnect can't simply replay the whole call).
pub fn is_retryable(config: &RetryConfig, err: &Error) -> bool {
    match status_code_of(err) {
        Some(status) => config.is_status_retryable(status),
        None => err.kind.is_retryable_at_transport(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_base_delay_grows_exponentially_and_caps() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(config.base_delay(1), Duration::from_millis(100));
        assert_eq!(config.base_delay(2), Duration::from_millis(200));
        // attempt 3 would be 400ms uncapped; max_delay caps it at 350ms
        assert_eq!(config.base_delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_uniform_bounds() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_secs(60));
        for _ in 0..200 {
            let delay = config.calculate_delay(1, None);
            assert!(delay >= Duration::from_millis(500), "{delay:?} below 0.5x floor");
            assert!(delay <= Duration::from_millis(1500), "{delay:?} above 1.5x ceiling");
        }
    }

    #[test]
    fn test_retry_after_floor_wins_over_small_jitter() {
        let config = RetryConfig::new().with_initial_delay(Duration::from_millis(10));
        let delay = config.calculate_delay(1, Some(Duration::from_secs(30)));
        assert!(delay >= Duration::from_secs(30));
    }

    #[test]
    fn test_default_retryable_status_codes() {
        let config = RetryConfig::new();
        for code in [429, 500, 502, 503, 504] {
            assert!(config.is_status_retryable(code));
        }
        assert!(!config.is_status_retryable(400));
        assert!(!config.is_status_retryable(401));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let config = RetryConfig::new().with_max_attempts(3).with_initial_delay(Duration::from_millis(1));
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(config, move |_attempt| {
            let count = count_clone.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(Error::server("temporary outage"))
                } else {
                    Ok::<i32, Error>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_immediately_on_non_retryable_kind() {
        let config = RetryConfig::new().with_max_attempts(5);
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result: Result<()> = retry_with_backoff(config, move |_attempt| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::authentication("bad api key")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts_and_returns_last_error() {
        let config = RetryConfig::new().with_max_attempts(2).with_initial_delay(Duration::from_millis(1));
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result: Result<()> = retry_with_backoff(config, move |_attempt| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::server("still down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_is_retryable_uses_kind_when_no_status() {
        let config = RetryConfig::new();
        assert!(is_retryable(&config, &Error::streaming("connection reset")));
        assert!(!is_retryable(&config, &Error::invalid_request("bad schema")));
    }
}
