//! Backoff for idempotent tracker requests.
//!
//! Retries timeouts, connection failures, 5xx, 408 and 429. Never retries
//! other 4xx, in particular the 409/412 concurrency rejections, which must
//! reach the sync engine untouched.

use std::future::Future;
use std::time::Duration;

use issuedesk_core::RetrySettings;
use reqwest::{Response, StatusCode};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS)
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.initial_delay_ms,
            settings.max_delay_ms,
        )
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

pub fn is_retryable_error(error: &reqwest::Error) -> RetryDecision {
    if error.is_timeout() || error.is_connect() {
        return RetryDecision::Retry;
    }
    match error.status() {
        Some(status) => is_retryable_status(status),
        None => RetryDecision::NoRetry,
    }
}

pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it yields a non-retryable outcome or the retry
/// budget is spent.
///
/// When retries run out on a retryable status, the last response is
/// returned so the caller can report its status.
pub async fn with_retry<F, Fut>(config: &RetryConfig, operation: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let outcome = operation().await;
        let retryable = match &outcome {
            Ok(response) => is_retryable_status(response.status()),
            Err(e) => is_retryable_error(e),
        };

        if retryable == RetryDecision::NoRetry || attempt >= config.max_retries {
            if attempt > 0 && outcome.is_ok() {
                tracing::info!("Request finished after {} retries", attempt);
            }
            return outcome;
        }

        let delay = config.delay_for_attempt(attempt);
        match &outcome {
            Ok(response) => tracing::warn!(
                "Retryable status {}, attempt {} of {}, waiting {:?}",
                response.status(),
                attempt + 1,
                config.max_retries + 1,
                delay
            ),
            Err(e) => tracing::warn!(
                "Retryable error on attempt {} of {}: {}, waiting {:?}",
                attempt + 1,
                config.max_retries + 1,
                e,
                delay
            ),
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
