//! Test configuration helpers

use http_stream::{BatchFailurePolicy, Config, FetchConfig, RetryConfig};
use std::time::Duration;

/// Config with millisecond backoff so retry tests finish quickly
///
/// Only the statuses in `retryable` are retried.
pub fn fast_config(max_attempts: u32, retryable: &[u16]) -> Config {
    Config {
        retry: RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            retryable_statuses: retryable.iter().copied().collect(),
            jitter_bound: Duration::from_millis(2),
        },
        fetch: FetchConfig {
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        },
        shutdown_timeout: Duration::from_secs(5),
    }
}

/// Same as [`fast_config`] with the per-URL batch failure policy
pub fn per_url_config(max_attempts: u32, retryable: &[u16]) -> Config {
    let mut config = fast_config(max_attempts, retryable);
    config.fetch.batch_failure = BatchFailurePolicy::PerUrl;
    config
}

/// A local URL nothing is listening on, so connecting is refused
pub fn refused_url(path: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}{path}")
}
