//! Bounded exponential backoff for provider calls

use reqwest::StatusCode;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// A failed attempt, classified by whether trying again can help
#[derive(Debug)]
pub enum AttemptError {
    /// Timeouts, dropped connections, rate limits and server errors
    Transient(Error),
    /// Rejected requests: bad credentials, unknown model, malformed body
    Permanent(Error),
}

impl AttemptError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, error: Error) -> Self {
        if is_transient_status(status) {
            Self::Transient(error)
        } else {
            Self::Permanent(error)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn into_error(self) -> Error {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) | Self::Permanent(e) => fmt::Display::fmt(e, f),
        }
    }
}

/// 408, 429 and 5xx are worth another attempt; other 4xx are not
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Retry settings shared by the HTTP providers
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Override the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation` until it succeeds, fails permanently, or the
    /// retries are exhausted
    ///
    /// The last error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if !e.is_transient() {
                        tracing::debug!("{} failed permanently: {}", label, e);
                    }
                    return Err(e.into_error());
                }
            }
        }
    }
}
