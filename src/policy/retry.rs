//! Failure classification and exponential backoff

use crate::config::RetryConfig;
use crate::crawler::{FetchError, ParseError};
use crate::task::{ProcessingTask, RetryDecision};
use chrono::{DateTime, Duration, Utc};

/// Retry reason given to 429 responses; the coordinator keys host
/// rate-limiting on it
pub const RATE_LIMITED_REASON: &str = "rate limited";

/// Decides what happens to a task after a failed attempt
///
/// Implementations are pure: the same task, error and time always give the
/// same decision, and deciding changes nothing.
pub trait RetryPolicy: Send + Sync {
    fn on_failure(
        &self,
        task: &ProcessingTask,
        error: &anyhow::Error,
        now: DateTime<Utc>,
    ) -> RetryDecision;
}

/// How a failure should be treated before attempt limits are considered
#[derive(Debug, Clone, PartialEq)]
enum FailureClass {
    /// Worth trying again, optionally not before the server's Retry-After
    Transient {
        reason: String,
        not_before: Option<Duration>,
    },
    /// Nothing to fetch; drop quietly
    Gone(String),
    /// Will not succeed by retrying
    Permanent(String),
}

/// Exponential backoff: `base * multiplier^attempt`, capped at `max_delay`
///
/// Classification:
///
/// - 404 / 410 and robots.txt denials are discarded
/// - 429, 5xx, timeouts, connection failures and unknown errors are retried
/// - other 4xx, redirect loops and parse failures are dead-lettered
///
/// A retryable failure on the last allowed attempt is dead-lettered with
/// reason `retries exhausted`.
#[derive(Debug, Clone)]
pub struct BackoffRetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl BackoffRetryPolicy {
    /// Creates a backoff policy
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Attempts allowed before a retryable failure is dead-lettered
    /// * `base_delay` - Delay after the first failure
    /// * `multiplier` - Growth factor per further attempt
    /// * `max_delay` - Upper bound for every delay, including a server's Retry-After
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::milliseconds(config.base_delay_ms as i64),
            config.multiplier,
            Duration::milliseconds(config.max_delay_ms as i64),
        )
    }

    /// Backoff before the retry that follows attempt number `attempt`
    ///
    /// # Arguments
    ///
    /// * `attempt` - Attempts already made before the failing one (0 for the first)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.num_milliseconds() as f64;
        let max_ms = self.max_delay.num_milliseconds() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::milliseconds(delay_ms as i64)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn classify(error: &anyhow::Error) -> FailureClass {
        if let Some(fetch) = error.downcast_ref::<FetchError>() {
            return classify_fetch(fetch);
        }
        if let Some(parse) = error.downcast_ref::<ParseError>() {
            return FailureClass::Permanent(format!("parse error: {}", parse));
        }
        FailureClass::Transient {
            reason: "unexpected error".to_string(),
            not_before: None,
        }
    }
}

impl Default for BackoffRetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

fn classify_fetch(error: &FetchError) -> FailureClass {
    let transient = |reason: &str| FailureClass::Transient {
        reason: reason.to_string(),
        not_before: None,
    };

    match error {
        FetchError::Timeout { .. } => transient("timeout"),
        FetchError::Connect { .. } => transient("connection failed"),
        FetchError::Body { .. } | FetchError::Request { .. } => transient("request failed"),
        FetchError::Redirect { .. } => FailureClass::Permanent("redirect loop".to_string()),
        FetchError::RobotsDenied { .. } => FailureClass::Gone("disallowed by robots.txt".to_string()),
        FetchError::Status {
            status,
            retry_after,
            ..
        } => match *status {
            404 => FailureClass::Gone("not found (404)".to_string()),
            410 => FailureClass::Gone("gone (410)".to_string()),
            429 => FailureClass::Transient {
                reason: RATE_LIMITED_REASON.to_string(),
                not_before: retry_after.map(seconds_saturating),
            },
            500..=599 => FailureClass::Transient {
                reason: format!("server error {}", status),
                not_before: retry_after.map(seconds_saturating),
            },
            400..=499 => FailureClass::Permanent(format!("client error {}", status)),
            other => FailureClass::Permanent(format!("unexpected status {}", other)),
        },
    }
}

// Retry-After comes straight off the wire and may not fit a Duration
fn seconds_saturating(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl RetryPolicy for BackoffRetryPolicy {
    fn on_failure(
        &self,
        task: &ProcessingTask,
        error: &anyhow::Error,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        match Self::classify(error) {
            FailureClass::Gone(reason) => RetryDecision::Discard { reason },
            FailureClass::Permanent(reason) => RetryDecision::DeadLetter { reason },
            FailureClass::Transient { reason, not_before } => {
                let attempt = task.attempt_count();
                if attempt.saturating_add(1) >= self.max_attempts {
                    return RetryDecision::DeadLetter {
                        reason: format!("retries exhausted ({})", reason),
                    };
                }

                let backoff = self.next_delay(attempt);
                let delay = match not_before {
                    Some(requested) => backoff.max(requested.min(self.max_delay)),
                    None => backoff,
                };
                RetryDecision::Retry {
                    eligible_at: now
                        .checked_add_signed(delay)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    reason,
                }
            }
        }
    }
}
