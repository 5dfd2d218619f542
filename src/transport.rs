//! HTTP transport abstraction
//!
//! The coordinator never talks to an HTTP client directly. It is handed a
//! [`Transport`] at construction time, which performs exactly one GET per call
//! and reports either a status plus body, or a [`TransportError`]. Retrying is
//! layered on top by [`RetryPolicy`](crate::retry::RetryPolicy).

use crate::config::FetchConfig;
use crate::error::{Result, TransportError};
use async_trait::async_trait;

/// Status and body of one HTTP response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Body bytes, `None` when the response carried no content
    pub body: Option<Vec<u8>>,
}

impl TransportResponse {
    /// Create a new response
    pub fn new(status: u16, body: Option<Vec<u8>>) -> Self {
        Self { status, body }
    }
}

/// A single HTTP GET capability
///
/// Implementations must not retry on their own and must not treat any status
/// code as an error.
///
/// # Examples
///
/// ```no_run
/// use http_stream::transport::{ReqwestTransport, Transport};
/// use http_stream::config::FetchConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = ReqwestTransport::new(&FetchConfig::default())?;
/// let response = transport.get("http://localhost:8080/api/test").await?;
/// println!("status {}", response.status);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one GET request against `url`
    async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from the fetch configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        let status = response.status().as_u16();
        if status_forbids_body(status) {
            return Ok(TransportResponse::new(status, None));
        }

        let bytes = response.bytes().await.map_err(|e| {
            tracing::warn!(url = %url, status, error = %e, "failed to read response body");
            TransportError::from_body_read(url, &e)
        })?;

        // error responses with nothing in them carry no content
        let body = if bytes.is_empty() && status >= 400 {
            None
        } else {
            Some(bytes.to_vec())
        };

        Ok(TransportResponse::new(status, body))
    }
}

/// Statuses that never carry a message body
fn status_forbids_body(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}
