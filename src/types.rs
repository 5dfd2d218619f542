//! Core types for http-stream

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Status value of a result for which no HTTP response was ever obtained
pub const SENTINEL_STATUS: i32 = -1;

/// Outcome of fetching one URL
///
/// Immutable once built. A `status` of [`SENTINEL_STATUS`] means the transport
/// failed on every attempt and no response exists. `body` is `None` when there
/// was no content at all, which is different from `Some` of an empty vector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    status: i32,
    body: Option<Vec<u8>>,
    url: String,
}

impl FetchResult {
    /// Create a result from a received response
    pub fn new(status: i32, body: Option<Vec<u8>>, url: impl Into<String>) -> Self {
        Self {
            status,
            body,
            url: url.into(),
        }
    }

    /// Create the sentinel result standing in for "no response obtained"
    pub fn sentinel(url: impl Into<String>) -> Self {
        Self::new(SENTINEL_STATUS, None, url)
    }

    /// HTTP status code, or [`SENTINEL_STATUS`]
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Raw body bytes, if the response carried any content
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The URL this result was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this is the "no response obtained" sentinel
    pub fn is_sentinel(&self) -> bool {
        self.status == SENTINEL_STATUS
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }

    /// Body decoded as UTF-8, or the literal `"null"` when there is no body
    pub fn body_or_null(&self) -> Cow<'_, str> {
        self.body_text().unwrap_or(Cow::Borrowed("null"))
    }

    /// Consume the result, returning the owned body
    pub fn into_body(self) -> Option<Vec<u8>> {
        self.body
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(
                f,
                "code:{} url:{} body:{} bytes",
                self.status,
                self.url,
                body.len()
            ),
            None => write!(f, "code:{} url:{} body:null", self.status, self.url),
        }
    }
}
