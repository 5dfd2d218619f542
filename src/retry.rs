//! Retry logic with exponential backoff
//!
//! This module wraps a single GET attempt with bounded retry. An attempt is
//! retried when it fails at the transport level with a retryable error, or when
//! the response status is in the configured retryable set. Delays grow
//! exponentially with a random jitter on top to prevent thundering herd.
//!
//! # Example
//!
//! ```no_run
//! use http_stream::config::RetryConfig;
//! use http_stream::retry::RetryPolicy;
//! use http_stream::transport::{ReqwestTransport, Transport};
//! use http_stream::config::FetchConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> http_stream::Result<()> {
//! let transport = ReqwestTransport::new(&FetchConfig::default())?;
//! let policy = RetryPolicy::new(RetryConfig::default());
//! let url = "http://localhost:8080/api/test";
//! let response = policy
//!     .execute(url, &CancellationToken::new(), || transport.get(url))
//!     .await?;
//! println!("final status {}", response.status);
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, Result, TransportError, TransportErrorKind};
use crate::transport::TransportResponse;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Largest exponent used for the backoff; later retries keep this delay
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections) should return `true`.
/// Failures that will repeat identically (a malformed URL) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the attempt should be repeated
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self.kind {
            TransportErrorKind::Connect
            | TransportErrorKind::Timeout
            | TransportErrorKind::Request
            | TransportErrorKind::Body => true,
            TransportErrorKind::InvalidUrl => false,
        }
    }
}

/// Bounded exponential-backoff retry around single GET attempts
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from its configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy runs with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts per URL, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Whether a response with this status should be retried
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.config.retryable_statuses.contains(&status)
    }

    /// Deterministic part of the delay before retry `attempt` (1-indexed):
    /// `base_delay * 2^attempt`, saturating
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(MAX_BACKOFF_EXPONENT);
        self.config.base_delay.saturating_mul(1u32 << shift)
    }

    /// Full delay before retry `attempt`, jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay_for_attempt(attempt)
            .saturating_add(add_jitter(self.config.jitter_bound))
    }

    /// Run `operation` until it yields a non-retryable outcome or attempts run out
    ///
    /// # Returns
    ///
    /// - the first response whose status is not retryable
    /// - the last response if every attempt produced a retryable status
    /// - [`Error::Transport`] if the last attempt failed at the transport level,
    ///   or a non-retryable transport error occurred
    /// - [`Error::Cancelled`] if `cancel` fired during an attempt or a backoff sleep
    pub async fn execute<F, Fut>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<TransportResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<TransportResponse, TransportError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = operation() => outcome,
            };

            let reason = match outcome {
                Ok(response) if !self.is_retryable_status(response.status) => {
                    if attempt > 1 {
                        tracing::info!(
                            url = %url,
                            attempts = attempt,
                            status = response.status,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Ok(response) if attempt >= max_attempts => {
                    tracing::error!(
                        url = %url,
                        attempts = attempt,
                        status = response.status,
                        "Retry attempts exhausted, keeping last response"
                    );
                    return Ok(response);
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) if e.is_retryable() && attempt < max_attempts => e.to_string(),
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            url = %url,
                            error = %e,
                            attempts = attempt,
                            "Request failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(
                            url = %url,
                            error = %e,
                            "Request failed with non-retryable error"
                        );
                    }
                    return Err(Error::Transport(e));
                }
            };

            let delay = self.delay_for_attempt(attempt);
            tracing::warn!(
                url = %url,
                reason = %reason,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis(),
                "Request failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Uniform random jitter in `0..=bound`
fn add_jitter(bound: Duration) -> Duration {
    let max_nanos = u64::try_from(bound.as_nanos()).unwrap_or(u64::MAX);
    let nanos = rand::thread_rng().gen_range(0..=max_nanos);
    Duration::from_nanos(nanos)
}
