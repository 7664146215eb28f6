use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::classify::Route;

/// Upper bound (exclusive) of the random delay before a secondary-route retry.
const SECONDARY_JITTER_MS: u64 = 1000;

/// How primary-route retry delays grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicyType {
    /// `(2^(n-1) - 1) * retry_delay`, capped at `max_retry_delay`.
    #[default]
    Exponential,
    /// Always `retry_delay`.
    Fixed,
}

/// Classification of one attempt's outcome for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Attempt exceeded its try timeout.
    Timeout,
    /// Connection-level failure (refused, reset, DNS).
    Connection,
    /// 503: server asked us to back off.
    Throttled,
    /// 500.
    Http5xx(u16),
    /// 404. Only retryable when it came from the secondary endpoint.
    NotFound,
    /// Anything else, including success. Never retried.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Retry parameters. Build with `Default` and field overrides, then call
/// `normalized` (done by `RetryPolicy::new`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    pub policy_type: RetryPolicyType,
    /// Attempts including the first. At least 1.
    pub max_tries: u32,
    /// Soft deadline for a single attempt.
    pub try_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Read-only replica host (`name` or `name:port`) used on even attempts.
    pub secondary_host: Option<String>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            policy_type: RetryPolicyType::Exponential,
            max_tries: 4,
            try_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(4),
            max_retry_delay: Duration::from_secs(120),
            secondary_host: None,
        }
    }
}

impl RetryOptions {
    /// Replaces unusable values with defaults and clamps `retry_delay` to
    /// `max_retry_delay`.
    pub fn normalized(mut self) -> Self {
        let defaults = RetryOptions::default();
        if self.max_tries == 0 {
            self.max_tries = defaults.max_tries;
        }
        if self.try_timeout.is_zero() {
            self.try_timeout = defaults.try_timeout;
        }
        if self.max_retry_delay.is_zero() {
            self.max_retry_delay = defaults.max_retry_delay;
        }
        self.retry_delay = self.retry_delay.min(self.max_retry_delay);
        self.secondary_host = self
            .secondary_host
            .take()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());
        self
    }

    /// Decide whether attempt `attempt` (1-based) should be followed by
    /// another one, given where it went and how it ended.
    pub fn decide(&self, attempt: u32, route: Route, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_tries {
            return RetryDecision::NoRetry;
        }

        let retryable = match kind {
            // A secondary 404 may be replication lag: retry, on the primary.
            ErrorKind::NotFound => route == Route::Secondary,
            ErrorKind::Throttled | ErrorKind::Http5xx(_) => true,
            ErrorKind::Timeout | ErrorKind::Connection => true,
            ErrorKind::Other => false,
        };
        if !retryable {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(route, attempt))
    }

    /// Delay before the attempt following `attempt` on `route`.
    pub fn backoff(&self, route: Route, attempt: u32) -> Duration {
        match route {
            Route::Primary => self.primary_backoff(attempt),
            Route::Secondary => {
                Duration::from_millis(rand::thread_rng().gen_range(0..SECONDARY_JITTER_MS))
            }
        }
    }

    /// Deterministic part of the backoff: exponential or fixed.
    pub fn primary_backoff(&self, attempt: u32) -> Duration {
        match self.policy_type {
            RetryPolicyType::Exponential => {
                let exp = attempt.saturating_sub(1).min(31);
                let factor = (1u32 << exp) - 1;
                self.retry_delay
                    .saturating_mul(factor)
                    .min(self.max_retry_delay)
            }
            RetryPolicyType::Fixed => self.retry_delay,
        }
    }
}
