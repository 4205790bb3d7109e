//! Retry policy for source fetches.
//!
//! Each failed attempt is classified from the transport error or the HTTP
//! status. Only transient kinds are retried, with exponential backoff that
//! honors an origin's `Retry-After`.

use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::PipelineError;

/// Upper bound on any single wait between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How a fetch attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused or reset, DNS failure
    Connect,
    /// Attempt deadline passed
    Timeout,
    /// Body stream broke off mid-transfer
    Interrupted,
    /// Origin answered with a non-success status
    Status(u16),
    /// Body exceeds the configured size limit
    TooLarge,
    /// Malformed URL, redirect loop and other request errors
    Other,
}

impl FailureKind {
    /// Classify a reqwest error by its kind.
    pub fn of_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if let Some(status) = error.status() {
            Self::Status(status.as_u16())
        } else if error.is_body() {
            Self::Interrupted
        } else {
            Self::Other
        }
    }

    pub fn is_transient(self) -> bool {
        match self {
            Self::Connect | Self::Timeout | Self::Interrupted => true,
            Self::Status(code) => code == 408 || code == 429 || (500..=599).contains(&code),
            Self::TooLarge | Self::Other => false,
        }
    }
}

/// A failed attempt, carrying the error reported if no retry follows.
#[derive(Debug)]
pub struct FailedAttempt {
    pub kind: FailureKind,
    pub error: PipelineError,
    /// Delay requested by the origin via `Retry-After`
    pub retry_after: Option<Duration>,
}

impl FailedAttempt {
    pub fn new(kind: FailureKind, error: PipelineError) -> Self {
        Self {
            kind,
            error,
            retry_after: None,
        }
    }
}

/// `[fetch]` retry settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            retries: config.retry_attempts,
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Wait before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `retries_done` counts retries already made.
    pub fn next_delay(&self, retries_done: u32, failure: &FailedAttempt) -> Option<Duration> {
        if retries_done >= self.retries || !failure.kind.is_transient() {
            return None;
        }
        let backoff = self.backoff(retries_done);
        let delay = failure.retry_after.map_or(backoff, |after| after.max(backoff));
        Some(delay.min(MAX_BACKOFF))
    }
}
