use super::Endpoint;

use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(64);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Outcome of consulting a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether the request should be attempted again.
    pub retry: bool,
    /// How long to wait before the next attempt.
    pub delay: Duration,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }

    fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

/// Decides which failed requests are attempted again and when.
///
/// Only `429 Too Many Requests` and `503 Service Unavailable` are retried.
/// A `429` waits for the server's `Retry-After` if one was sent, and a `503`
/// backs off exponentially up to `max_delay`. The authorization exchange is
/// never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self::default().max_attempts(1)
    }

    /// Set the maximum number of attempts for one request, including the first.
    ///
    /// Values below 1 are treated as 1.
    pub fn max_attempts(self, n: u32) -> Self {
        Self {
            max_attempts: n.max(1),
            ..self
        }
    }

    /// Set the base delay of the exponential backoff for `503` responses.
    pub fn base_delay(self, delay: Duration) -> Self {
        Self {
            base_delay: delay,
            ..self
        }
    }

    /// Set the upper bound of the exponential backoff.
    pub fn max_delay(self, delay: Duration) -> Self {
        Self {
            max_delay: delay,
            ..self
        }
    }

    /// Set the delay used for `429` responses without a `Retry-After` header.
    pub fn default_retry_after(self, delay: Duration) -> Self {
        Self {
            default_retry_after: delay,
            ..self
        }
    }

    /// Returns the configured maximum number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide whether to retry after `attempt` (1-based) failed with `status`.
    pub fn should_retry(
        &self,
        attempt: u32,
        status: u16,
        endpoint: Endpoint,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if endpoint == Endpoint::AuthorizeAccount || attempt >= self.max_attempts {
            return RetryDecision::stop();
        }

        match status {
            429 => RetryDecision::after(retry_after.unwrap_or(self.default_retry_after)),
            503 => RetryDecision::after(self.backoff(attempt)),
            _ => RetryDecision::stop(),
        }
    }

    /// `min(max_delay, base_delay * 2^attempt)`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
