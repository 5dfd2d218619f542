//! Configuration types for http-stream

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Top-level configuration for a [`StreamCoordinator`](crate::StreamCoordinator)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Retry behavior for each outbound GET
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP client and batch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// How long `shutdown()` waits for in-flight batches (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the coordinator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if let Some(status) = self
            .retry
            .retryable_statuses
            .iter()
            .find(|s| !(100..=999).contains(*s))
        {
            return Err(Error::config(
                "retry.retryable_statuses",
                format!("{status} is not a valid HTTP status code"),
            ));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(Error::config(
                "fetch.request_timeout",
                "request_timeout must be greater than zero",
            ));
        }
        if self.fetch.connect_timeout.is_zero() {
            return Err(Error::config(
                "fetch.connect_timeout",
                "connect_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
///
/// The delay before retry `n` (1-indexed) is `base_delay * 2^n` plus a random
/// jitter in `0..=jitter_bound`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per URL, including the first one (default: 4)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff (default: 1 second)
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Response statuses that are treated as transient and retried
    /// (default: 404, 408 and every 5xx status)
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: BTreeSet<u16>,

    /// Upper bound of the random jitter added to each delay (default: 100 milliseconds)
    #[serde(default = "default_jitter_bound", with = "duration_serde")]
    pub jitter_bound: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            retryable_statuses: default_retryable_statuses(),
            jitter_bound: default_jitter_bound(),
        }
    }
}

/// What a batch does when one URL fails fatally at the transport level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Abandon the batch and report a single sentinel result carrying the
    /// batch's first URL (default)
    #[default]
    AbortBatch,
    /// Record a sentinel for the failing URL and carry on with the rest
    PerUrl,
}

/// HTTP client and batch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single GET including the body (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for establishing a connection (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// How long idle pooled connections are kept (default: 5 minutes)
    ///
    /// Recycling connections lets the client pick up DNS changes in long-running
    /// processes.
    #[serde(default = "default_pool_idle_timeout", with = "duration_serde")]
    pub pool_idle_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Batch behavior on fatal transport failure
    #[serde(default)]
    pub batch_failure: BatchFailurePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            pool_idle_timeout: default_pool_idle_timeout(),
            user_agent: default_user_agent(),
            batch_failure: BatchFailurePolicy::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_retryable_statuses() -> BTreeSet<u16> {
    let mut statuses: BTreeSet<u16> = (500..=599).collect();
    statuses.insert(404);
    statuses.insert(408);
    statuses
}

fn default_jitter_bound() -> Duration {
    Duration::from_millis(100)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_pool_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    format!("http-stream/{}", env!("CARGO_PKG_VERSION"))
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Durations are written as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
