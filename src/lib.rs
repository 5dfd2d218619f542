//! # http-stream
//!
//! Batch HTTP fetcher with retry and listener fan-out.
//!
//! ## Design Philosophy
//!
//! http-stream is designed to be:
//! - **Fire-and-forget** - Callers dispatch a batch and return immediately
//! - **Listener-driven** - Results arrive through registered listeners, no polling
//! - **Resilient** - Transient failures are retried with jittered exponential backoff
//! - **Injectable** - The HTTP transport is a trait object handed in at construction
//!
//! ## Quick Start
//!
//! ```no_run
//! use http_stream::{Config, FetchResult, ResponseListener, StreamCoordinator};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ResponseListener for Printer {
//!     fn on_responses(&self, results: &[FetchResult]) {
//!         for result in results {
//!             println!("code:{} body:{} url:{}", result.status(), result.body_or_null(), result.url());
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = StreamCoordinator::new(Config::default())?;
//!     coordinator.add_listener(Arc::new(Printer))?;
//!
//!     coordinator.request_one("http://localhost:8080/api/test")?;
//!
//!     // Later, when the application closes
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Listener registry and batch dispatch
pub mod coordinator;
/// Error types
pub mod error;
/// Sequential batch fetching
pub mod executor;
/// Retry logic with exponential backoff
pub mod retry;
/// HTTP transport abstraction
pub mod transport;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{BatchFailurePolicy, Config, FetchConfig, RetryConfig};
pub use coordinator::{ResponseListener, StreamCoordinator};
pub use error::{Error, Result, TransportError, TransportErrorKind};
pub use executor::FetchExecutor;
pub use retry::{IsRetryable, RetryPolicy};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
pub use types::{FetchResult, SENTINEL_STATUS};
