//! Error types for http-stream
//!
//! This module provides the error handling for the library:
//! - [`Error`], the crate-wide error returned by coordinator and configuration operations
//! - [`TransportError`], a single failed GET attempt that never produced an HTTP response
//!
//! Note that an HTTP status code is never an error here. Status codes are payload and
//! travel inside [`FetchResult`](crate::types::FetchResult).

use std::fmt;
use thiserror::Error;

/// Result type alias for http-stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for http-stream
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// A transport failure that survived every retry attempt
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The coordinator has been disposed and accepts no further operations
    #[error("coordinator disposed")]
    Disposed,

    /// The batch was cancelled before it completed
    #[error("batch cancelled")]
    Cancelled,

    /// A listener called back into the registry of the coordinator delivering to it
    #[error("registry operation attempted from inside a listener callback")]
    Reentrant,

    /// A batch was dispatched outside of a tokio runtime
    #[error("no tokio runtime available to dispatch the batch")]
    NoRuntime,

    /// HTTP client construction failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error pointing at a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Classification of a failed GET attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established (refused, DNS failure, TLS handshake)
    Connect,
    /// The request or the connection timed out
    Timeout,
    /// Any other failure while sending the request or receiving the response head
    Request,
    /// The response body could not be read
    Body,
    /// The URL could not be parsed or the request could not be built
    InvalidUrl,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::InvalidUrl => "invalid url",
        };
        f.write_str(s)
    }
}

/// A single GET attempt that produced no HTTP response
#[derive(Clone, Debug, Error)]
#[error("{kind} failure for {url}: {message}")]
pub struct TransportError {
    /// The URL being fetched
    pub url: String,
    /// What went wrong
    pub kind: TransportErrorKind,
    /// Underlying error message from the transport
    pub message: String,
}

impl TransportError {
    /// Create a new transport error
    pub fn new(url: impl Into<String>, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a reqwest error raised while fetching `url`
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_builder() {
            TransportErrorKind::InvalidUrl
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Request
        };
        Self::new(url, kind, error.to_string())
    }

    /// Classify a failure while reading a body whose headers already arrived
    ///
    /// Anything but a timeout is a [`TransportErrorKind::Body`] failure, since the
    /// connection itself was established.
    pub fn from_body_read(url: &str, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else {
            TransportErrorKind::Body
        };
        Self::new(url, kind, error.to_string())
    }
}
