//! Error types for the rate limiting core.
//!
//! Errors fall into exactly three disjoint kinds: a misconfiguration
//! (never retried), a backend failure (the store itself, retried once
//! only for an expired script cache), and a rate limit being exceeded
//! (a domain outcome rather than a failure).

use thiserror::Error;

/// Result type used throughout this crate.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors produced while checking or managing a rate limit.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The request was denied. Not an error in the failure sense: a
    /// domain outcome callers routinely translate into an HTTP 429.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Seconds the caller should wait before retrying, always >= 1.
        retry_after_secs: u64,
        /// The unscaled limit that was exceeded.
        limit: u64,
        /// Always 0 on this variant; kept for symmetry with `CheckResult`.
        remaining: u64,
    },

    /// A bad rate string, unknown algorithm, or invalid configuration
    /// value. Raised synchronously, never retried.
    #[error("rate limit configuration error: {0}")]
    ConfigError(String),

    /// The store was unreachable, timed out, returned a malformed
    /// script result, or lost a script that could not be re-uploaded.
    #[error("rate limit backend error: {0}")]
    BackendError(String),

    /// Transparent conversion from the underlying Redis client error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RateLimitError {
    /// Build a configuration error naming the offending input.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Build a backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::BackendError(msg.into())
    }

    /// Build a rate-limit-exceeded error from a raw `retry_after_ms`,
    /// rounding up to whole seconds and flooring at 1.
    pub fn exceeded(retry_after_ms: i64, limit: u64) -> Self {
        let secs = ((retry_after_ms.max(0) as u64) + 999) / 1000;
        Self::RateLimitExceeded {
            retry_after_secs: secs.max(1),
            limit,
            remaining: 0,
        }
    }

    /// True if this is a domain denial rather than a failure.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// The retry-after duration in seconds, if this is a denial.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<bb8::RunError<redis::RedisError>> for RateLimitError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        Self::BackendError(err.to_string())
    }
}
