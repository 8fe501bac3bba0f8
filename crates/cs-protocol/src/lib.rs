//! cs-protocol: Wire protocol for multiplexed codespace sessions
//!
//! This crate defines the binary protocol spoken over the single transport
//! that joins a codespace. Control requests (join, start a service, open a
//! channel, run a command) and the raw byte streams of every open logical
//! channel share that transport, distinguished by a channel id in each
//! frame header.

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use channel::ChannelId;
pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{ErrorCode, Message, MessageType, PROTOCOL_VERSION};
