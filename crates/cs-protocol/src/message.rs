//! Message types for the session protocol
//!
//! # Message Flow
//!
//! 1. Client sends `Join` on the control channel, remote answers `JoinAck`
//! 2. `StartService` on the control channel is answered by `ServiceStarted`
//!    (or `Error`) with the port the service listens on and its login user
//! 3. `ChannelOpen` / `Exec` are sent on a freshly allocated channel id and
//!    answered on that id by `ChannelOpened` (or `Error`)
//! 4. `Data` flows in both directions on an open channel; `ChannelEof`
//!    half-closes one direction, `ChannelClose` tears the channel down
//! 5. Either side may send `Heartbeat`; the peer echoes the timestamp in
//!    `HeartbeatAck`

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Current protocol version, carried in `Join`.
///
/// Format: "MAJOR.MINOR". The remote rejects a join whose major differs.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Join = 0x01,
    JoinAck = 0x02,
    StartService = 0x03,
    ServiceStarted = 0x04,
    ChannelOpen = 0x05,
    ChannelOpened = 0x06,
    Exec = 0x07,
    Data = 0x08,
    ChannelEof = 0x09,
    ChannelClose = 0x0A,
    Heartbeat = 0x0B,
    HeartbeatAck = 0x0C,
    Error = 0xFF,
}

impl MessageType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::JoinAck),
            0x03 => Some(Self::StartService),
            0x04 => Some(Self::ServiceStarted),
            0x05 => Some(Self::ChannelOpen),
            0x06 => Some(Self::ChannelOpened),
            0x07 => Some(Self::Exec),
            0x08 => Some(Self::Data),
            0x09 => Some(Self::ChannelEof),
            0x0A => Some(Self::ChannelClose),
            0x0B => Some(Self::Heartbeat),
            0x0C => Some(Self::HeartbeatAck),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Error codes for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 0,
    /// Join credentials were rejected
    AuthenticationFailed = 1,
    /// The requested service could not be started
    ServiceUnavailable = 2,
    /// Nothing is listening on the requested remote port
    ChannelRefused = 3,
    /// Frame referenced a channel the peer does not know
    ChannelNotFound = 4,
    InvalidMessage = 5,
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Join the workspace session; the token is the only credential
    Join {
        session_id: String,
        token: String,
        /// Use `PROTOCOL_VERSION` when sending
        version: String,
    },

    JoinAck {
        accepted: bool,
        reason: Option<String>,
    },

    /// Ask the remote side to start a named service (e.g. "sshd")
    StartService { name: String },

    ServiceStarted {
        /// Port the service listens on inside the workspace
        port: u16,
        /// Login identity to use against the service
        user: String,
    },

    /// Open a byte stream to a port inside the workspace
    ChannelOpen { port: u16 },

    ChannelOpened,

    /// Run one command; its stdout streams back as `Data` on the channel
    Exec {
        working_dir: Option<String>,
        command: String,
    },

    Data(Bytes),

    /// Sender will write no more data on this channel
    ChannelEof,

    ChannelClose,

    Heartbeat {
        /// Sender clock in milliseconds, echoed back for latency measurement
        timestamp: u64,
    },

    HeartbeatAck { timestamp: u64 },

    Error { code: ErrorCode, message: String },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Join { .. } => MessageType::Join,
            Message::JoinAck { .. } => MessageType::JoinAck,
            Message::StartService { .. } => MessageType::StartService,
            Message::ServiceStarted { .. } => MessageType::ServiceStarted,
            Message::ChannelOpen { .. } => MessageType::ChannelOpen,
            Message::ChannelOpened => MessageType::ChannelOpened,
            Message::Exec { .. } => MessageType::Exec,
            Message::Data(_) => MessageType::Data,
            Message::ChannelEof => MessageType::ChannelEof,
            Message::ChannelClose => MessageType::ChannelClose,
            Message::Heartbeat { .. } => MessageType::Heartbeat,
            Message::HeartbeatAck { .. } => MessageType::HeartbeatAck,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Build an error reply
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error {
            code,
            message: message.into(),
        }
    }

    /// Whether this message answers a control request
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Message::JoinAck { .. }
                | Message::ServiceStarted { .. }
                | Message::ChannelOpened
                | Message::Error { .. }
        )
    }
}

/// Major component of a "MAJOR.MINOR" version string
pub fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}
