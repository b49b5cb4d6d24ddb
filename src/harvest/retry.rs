//! Error classification and bounded retry with exponential backoff.
//!
//! Every failed attempt is reduced to a closed [`ErrorKind`], and
//! [`classify`] maps the kind to [`FailureType::Retryable`] or
//! [`FailureType::Fatal`]:
//!
//! | Kind | Type |
//! |------|------|
//! | `network`, `timeout` | Retryable |
//! | `rate_limited` (429) | Retryable |
//! | `server_error` (500, 502, 503, 504) | Retryable |
//! | `http_status` (any other status) | Fatal |
//! | `malformed_payload`, `invalid_request` | Fatal |
//! | `persistence` | Fatal |
//!
//! [`RetryPolicy::with_retry`] then drives an attempt closure until it
//! succeeds, fails fatally, or reaches the attempt ceiling.
//!
//! # Example
//!
//! ```
//! use harvester_core::harvest::{ErrorKind, FailureType, RetryDecision, RetryPolicy, classify};
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(classify(ErrorKind::ServerError), FailureType::Retryable);
//!
//! match policy.should_retry(classify(ErrorKind::RateLimited), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(attempt, 2);
//!         assert!(delay.as_secs() >= 5);
//!     }
//!     RetryDecision::DoNotRetry { .. } => unreachable!(),
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::sink::PersistenceError;
use crate::upstream::UpstreamError;

/// Default total attempts per page, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Closed set of per-page failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection-level failure.
    Network,
    /// Request exceeded its timeout.
    Timeout,
    /// HTTP 429.
    RateLimited,
    /// HTTP 500, 502, 503 or 504.
    ServerError,
    /// Any other non-success status.
    HttpStatus,
    /// 2xx body that is not usable.
    MalformedPayload,
    /// The request could not be built (bad endpoint or credential header).
    InvalidRequest,
    /// The payload could not be written.
    Persistence,
    /// The page was never attempted (cancellation or lost worker).
    Unprocessed,
}

impl ErrorKind {
    /// Stable snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::HttpStatus => "http_status",
            Self::MalformedPayload => "malformed_payload",
            Self::InvalidRequest => "invalid_request",
            Self::Persistence => "persistence",
            Self::Unprocessed => "unprocessed",
        }
    }

    /// Kind for an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            500 | 502 | 503 | 504 => Self::ServerError,
            _ => Self::HttpStatus,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry.
    Retryable,
    /// Will not succeed on retry.
    Fatal,
}

/// Maps an error kind to its retry class.
#[must_use]
pub fn classify(kind: ErrorKind) -> FailureType {
    match kind {
        ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::ServerError => {
            FailureType::Retryable
        }
        ErrorKind::HttpStatus
        | ErrorKind::MalformedPayload
        | ErrorKind::InvalidRequest
        | ErrorKind::Persistence
        | ErrorKind::Unprocessed => FailureType::Fatal,
    }
}

/// Reduces an upstream error to its kind.
#[must_use]
pub fn upstream_error_kind(error: &UpstreamError) -> ErrorKind {
    match error {
        UpstreamError::Network { .. } => ErrorKind::Network,
        UpstreamError::Timeout { .. } => ErrorKind::Timeout,
        UpstreamError::HttpStatus { status, .. } => ErrorKind::from_status(*status),
        UpstreamError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
        UpstreamError::InvalidEndpoint { .. }
        | UpstreamError::InvalidHeader { .. }
        | UpstreamError::ClientBuild { .. } => ErrorKind::InvalidRequest,
    }
}

/// Failure of one retry-wrapped attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// Fetch failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Write failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AttemptError {
    /// Classified kind of this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Upstream(error) => upstream_error_kind(error),
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    fn retry_after(&self) -> Option<&str> {
        match self {
            Self::Upstream(error) => error.retry_after(),
            Self::Persistence(_) => None,
        }
    }
}

/// The last error of a retry loop and how many attempts were made.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryExhausted {
    /// Last error, unchanged.
    #[source]
    pub error: AttemptError,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry ceiling and backoff schedule.
///
/// # Delay Calculation
///
/// ```text
/// delay = clamp(base_delay * 2^(attempt - 1), min_delay, max_delay) + jitter
/// ```
///
/// With defaults (base 2 s, clamp 5-60 s, jitter up to 500 ms) the three
/// retries of a 4-attempt run wait roughly 5 s, 5 s and 8 s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom timing and the default jitter.
    ///
    /// `max_attempts` is raised to 1 and `max_delay` to `min_delay` if needed.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            min_delay,
            max_delay: max_delay.max(min_delay),
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom ceiling and default timing.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the jitter ceiling.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    /// Runs `attempt_fn` until it succeeds, fails fatally, or the ceiling is hit.
    ///
    /// The closure receives the 1-indexed attempt number. A `Retry-After`
    /// header on a 429 replaces the computed backoff, clamped into the
    /// policy's delay bounds. Cancellation during a backoff sleep ends the
    /// loop with the last error.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhausted`] carrying the last error unchanged and the
    /// number of attempts made.
    pub async fn with_retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match attempt_fn(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => error,
            };
            let kind = error.kind();

            match self.should_retry(classify(kind), attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let retry_after_delay = if kind == ErrorKind::RateLimited {
                        error
                            .retry_after()
                            .and_then(parse_retry_after)
                            .map(|delay| delay.clamp(self.min_delay, self.max_delay))
                    } else {
                        None
                    };
                    let delay = retry_after_delay.unwrap_or(backoff_delay);

                    info!(
                        attempt = next_attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after_delay.is_some(),
                        kind = %kind,
                        error = %error,
                        "retrying"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!(attempt, "retry abandoned on cancellation");
                            return Err(RetryExhausted { error, attempts: attempt });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(kind = %kind, %reason, attempt, "not retrying");
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .base_delay
            .saturating_mul(factor)
            .max(self.min_delay)
            .min(self.max_delay);
        delay + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// Negative values and dates in the past yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    datetime.duration_since(SystemTime::now()).ok()
}
