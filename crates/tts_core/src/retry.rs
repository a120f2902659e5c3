//! Retry with exponential backoff
//!
//! Wraps a fallible async operation and re-invokes it according to a
//! [`RetryPolicy`]. A `Retry-After` header on the failing response overrides
//! the computed backoff.
//!
//! ```rust,ignore
//! use tts_core::retry::{RetryPolicy, retry};
//!
//! let policy = RetryPolicy::default();
//! let audio = retry(&policy, &sink, || provider.generate(&params, &ctx)).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ErrorCode, GeneratedError};
use crate::telemetry::{EventName, TelemetryEvent, TelemetrySink};

/// How often and how patiently a failing operation is retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (default: 3, so 4 tries total)
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 1000ms)
    #[serde(default = "default_initial_delay", alias = "initialDelayMs")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds (default: 10000ms)
    #[serde(default = "default_max_delay", alias = "maxDelayMs")]
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt (default: 2.0)
    #[serde(default = "default_backoff_factor", alias = "backoffFactor")]
    pub backoff_factor: f64,

    /// Error codes worth retrying; empty means every error is retried
    #[serde(default, alias = "retryableErrorCodes")]
    pub retryable_error_codes: Vec<ErrorCode>,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay() -> u64 {
    1000
}

const fn default_max_delay() -> u64 {
    10_000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            retryable_error_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial and maximum delay
    #[must_use]
    pub const fn with_delays(mut self, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Restrict retries to the given codes
    #[must_use]
    pub fn retrying_only(mut self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.retryable_error_codes = codes.into_iter().collect();
        self
    }

    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns an error message if the backoff factor is not a positive number.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 0.0) {
            return Err(format!(
                "backoff_factor must be a positive number, got {}",
                self.backoff_factor
            ));
        }
        Ok(())
    }

    /// Whether an error with the given code may be retried
    ///
    /// `rate_limited` is a kind of `http_error`, so listing `http_error` also
    /// retries 429 responses. Listing only `rate_limited` leaves other HTTP
    /// failures alone.
    #[must_use]
    pub fn is_retryable(&self, code: Option<ErrorCode>) -> bool {
        if self.retryable_error_codes.is_empty() {
            return true;
        }
        code.is_some_and(|code| {
            self.retryable_error_codes.contains(&code)
                || (code == ErrorCode::RateLimited
                    && self.retryable_error_codes.contains(&ErrorCode::HttpError))
        })
    }

    /// Exponential delay after the given 1-based attempt, capped at `max_delay_ms`
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = (self.initial_delay_ms as f64) * self.backoff_factor.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64).max(0.0);

        Duration::from_millis(capped_delay as u64)
    }

    /// Delay before retrying an error raised by the given attempt
    ///
    /// A `Retry-After` value in whole seconds wins over the exponential
    /// formula; both are capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for<E: RetryableError + ?Sized>(&self, attempt: u32, err: &E) -> Duration {
        match err.retry_after().and_then(parse_retry_after) {
            Some(seconds) => {
                Duration::from_millis(seconds.saturating_mul(1000).min(self.max_delay_ms))
            },
            None => self.backoff_delay(attempt),
        }
    }
}

fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Classification contract the retry engine relies on
pub trait RetryableError: fmt::Display {
    /// Taxonomy tag, if the error carries one
    fn error_code(&self) -> Option<ErrorCode> {
        None
    }

    /// Raw `Retry-After` header value, if the error carries response headers
    fn retry_after(&self) -> Option<&str> {
        None
    }

    /// Sanitized representation for telemetry
    fn snapshot(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl RetryableError for GeneratedError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(self.code)
    }

    fn retry_after(&self) -> Option<&str> {
        self.header("retry-after")
    }

    fn snapshot(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
            "provider": self.provider,
            "status": self.status,
        })
    }
}

impl RetryableError for String {}

/// Outcome of [`with_retry`] with bookkeeping
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The result of the last attempt
    pub result: Result<T, E>,
    /// Number of invocations made (1 = no retries)
    pub attempts: u32,
    /// Total time spent including sleeps
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Check if the operation succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Convert to standard Result, discarding metadata
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation`, retrying failures according to `policy`
///
/// The operation runs at most `max_attempts + 1` times. On give-up the last
/// error is returned unchanged. A `retry.attempt` event is emitted before each
/// sleep; the sleep suspends only the calling task.
#[allow(clippy::cast_possible_truncation)]
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    telemetry: &dyn TelemetrySink,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        attempts,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Operation succeeded after retries"
                    );
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            },
            Err(err) => {
                if !policy.is_retryable(err.error_code()) {
                    debug!(attempts, error = %err, "Operation failed with non-retryable error");
                    return RetryResult {
                        result: Err(err),
                        attempts,
                        total_duration: start.elapsed(),
                    };
                }

                if attempts > policy.max_attempts {
                    warn!(
                        attempts,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return RetryResult {
                        result: Err(err),
                        attempts,
                        total_duration: start.elapsed(),
                    };
                }

                let delay = policy.delay_for(attempts, &err);
                let delay_ms = delay.as_millis() as u64;
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms,
                    error = %err,
                    "Operation failed, retrying"
                );
                telemetry.emit(
                    &TelemetryEvent::new(EventName::RetryAttempt)
                        .measurement("attempt", attempts)
                        .measurement("delay_ms", delay_ms)
                        .meta("error", err.snapshot()),
                );

                tokio::time::sleep(delay).await;
            },
        }
    }
}

/// Run `operation` with retries, returning only the final result
pub async fn retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    telemetry: &dyn TelemetrySink,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    with_retry(policy, telemetry, operation).await.into_result()
}
