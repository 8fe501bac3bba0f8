//! Frame header layout
//!
//! ```text
//! +------+------------+----------------+
//! | type | channel id | payload length |
//! |  u8  |  u32 (BE)  |    u32 (BE)    |
//! +------+------------+----------------+
//! ```
//!
//! Channel 0 is the control channel. Payloads are capped at
//! [`MAX_PAYLOAD_SIZE`] so a corrupt length cannot make the reader buffer
//! gigabytes.

use bytes::{Buf, BufMut, BytesMut};

use crate::channel::ChannelId;
use crate::error::ProtocolError;
use crate::message::MessageType;

pub const HEADER_SIZE: usize = 9;

/// Largest payload either side will send or accept (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub channel_id: ChannelId,
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(channel_id: ChannelId, message_type: MessageType, payload_length: u32) -> Self {
        Self {
            message_type,
            channel_id,
            payload_length,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.message_type.as_u8());
        dst.put_u32(self.channel_id.as_u32());
        dst.put_u32(self.payload_length);
    }

    /// Take a header off the front of `src`.
    ///
    /// `Ok(None)` means more bytes are needed. Nothing is consumed on error
    /// or when the header is incomplete.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let message_type =
            MessageType::from_u8(src[0]).ok_or(ProtocolError::UnknownMessageType(src[0]))?;
        let payload_length = u32::from_be_bytes([src[5], src[6], src[7], src[8]]);
        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        src.advance(1);
        let channel_id = ChannelId::new(src.get_u32());
        src.advance(4);

        Ok(Some(Self {
            message_type,
            channel_id,
            payload_length,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let header = FrameHeader::new(ChannelId::new(7), MessageType::Data, 300);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[MessageType::Data.as_u8(), 0, 0, 0, 7, 0, 0, 0x01, 0x2C]
        );
        assert_eq!(FrameHeader::decode(&mut buf).unwrap(), Some(header));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_short_buffer_untouched() {
        let mut buf = BytesMut::from(&[MessageType::Data.as_u8(), 0, 0][..]);
        assert_eq!(FrameHeader::decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let header = FrameHeader::new(
            ChannelId::new(3),
            MessageType::Data,
            MAX_PAYLOAD_SIZE as u32 + 1,
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn test_unknown_type_byte() {
        let mut buf = BytesMut::from(&[0xEE, 0, 0, 0, 1, 0, 0, 0, 4][..]);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(ProtocolError::UnknownMessageType(0xEE))
        ));
    }
}
