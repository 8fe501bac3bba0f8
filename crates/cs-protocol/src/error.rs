use thiserror::Error;

use crate::message::MessageType;

/// Failures reading or writing session frames. Any of these ends the session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unrecognized frame type 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("frame payload of {size} bytes is over the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame header claims {header:?} but carries {payload:?}")]
    TypeMismatch {
        header: MessageType,
        payload: MessageType,
    },

    #[error("malformed payload: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("transport: {0}")]
    Io(#[from] std::io::Error),
}
