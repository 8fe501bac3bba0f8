//! Workspace API client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Settings for the workspace REST client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API
    pub api_url: String,

    /// Base URL of the web host serving `<login>.keys`
    pub web_url: String,

    /// Retry policy for transient (5xx) failures
    pub retry: RetryPolicy,

    /// Items requested per page when listing without a smaller limit.
    ///
    /// Capped at 100 by the server.
    pub page_size: usize,

    /// Polling backoff while waiting for a starting workspace
    pub start_backoff: BackoffConfig,

    /// Give up waiting for a workspace to become available after this long
    #[serde(with = "duration_secs")]
    pub start_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            web_url: "https://github.com".to_string(),
            retry: RetryPolicy::default(),
            page_size: 100,
            start_backoff: BackoffConfig::default(),
            start_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Bounded retry for transient API failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Sleep between attempts
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
