//! Logical channel identifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one logical channel multiplexed over a session transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Create a new channel ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this is the control-plane id
    pub fn is_control(&self) -> bool {
        *self == Self::CONTROL
    }

    /// Reserved id for control messages that are not bound to a channel
    pub const CONTROL: ChannelId = ChannelId(0);
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_control() {
            write!(f, "control")
        } else {
            write!(f, "channel-{}", self.0)
        }
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
