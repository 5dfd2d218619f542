//! Sequential batch fetching
//!
//! [`FetchExecutor`] turns an ordered list of URLs into an ordered list of
//! [`FetchResult`]s. URLs are fetched one at a time, each through the
//! [`RetryPolicy`], and each body is read completely before the next request
//! starts.

use crate::config::BatchFailurePolicy;
use crate::error::{Error, Result, TransportError, TransportErrorKind};
use crate::retry::RetryPolicy;
use crate::transport::{Transport, TransportResponse};
use crate::types::FetchResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs batches of GET requests against a shared transport
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    batch_failure: BatchFailurePolicy,
}

impl FetchExecutor {
    /// Create an executor over `transport`
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        batch_failure: BatchFailurePolicy,
    ) -> Self {
        Self {
            transport,
            policy,
            batch_failure,
        }
    }

    /// The retry policy applied to every URL
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch every URL in order
    ///
    /// A transport failure that survives all retries is not returned as an error.
    /// Under [`BatchFailurePolicy::AbortBatch`] the batch stops right there and the
    /// output is a single sentinel result carrying the batch's *first* URL. Under
    /// [`BatchFailurePolicy::PerUrl`] the failing URL gets its own sentinel and the
    /// batch continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires before the batch completes.
    pub async fn fetch_all(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<FetchResult>> {
        tracing::debug!(count = urls.len(), "Batch fetch started");
        let mut results = Vec::with_capacity(urls.len());

        for url in urls {
            match self.fetch_one(url, cancel).await {
                Ok(response) => {
                    tracing::debug!(url = %url, status = response.status, "Fetched");
                    results.push(FetchResult::new(
                        i32::from(response.status),
                        response.body,
                        url.as_str(),
                    ));
                }
                Err(Error::Transport(e)) => match self.batch_failure {
                    BatchFailurePolicy::AbortBatch => {
                        let first = urls.first().map(String::as_str).unwrap_or(url.as_str());
                        tracing::warn!(
                            url = %url,
                            error = %e,
                            completed = results.len(),
                            "Batch aborted on fatal transport failure"
                        );
                        return Ok(vec![FetchResult::sentinel(first)]);
                    }
                    BatchFailurePolicy::PerUrl => {
                        tracing::warn!(url = %url, error = %e, "No response obtained");
                        results.push(FetchResult::sentinel(url.as_str()));
                    }
                },
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(count = results.len(), "Batch fetch finished");
        Ok(results)
    }

    /// Fetch a single URL through the retry policy
    async fn fetch_one(&self, url: &str, cancel: &CancellationToken) -> Result<TransportResponse> {
        if let Err(e) = url::Url::parse(url) {
            return Err(Error::Transport(TransportError::new(
                url,
                TransportErrorKind::InvalidUrl,
                e.to_string(),
            )));
        }

        let transport = &self.transport;
        self.policy
            .execute(url, cancel, || transport.get(url))
            .await
    }
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("policy", &self.policy)
            .field("batch_failure", &self.batch_failure)
            .finish_non_exhaustive()
    }
}
