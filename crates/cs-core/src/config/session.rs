//! Session transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Settings for the multiplexed session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on connect + join
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Heartbeat interval
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Close the session after this long without inbound traffic
    #[serde(with = "duration_secs")]
    pub keepalive_timeout: Duration,

    /// Capacity of the shared outbound frame queue
    pub outbound_queue: usize,

    /// Bytes a channel may hold unread before it is torn down
    pub channel_buffer_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(90),
            outbound_queue: 256,
            channel_buffer_limit: 8 * 1024 * 1024,
        }
    }
}
