//! `FrameCodec` turns the session transport into a stream of [`Frame`]s

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::channel::ChannelId;
use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// One message addressed to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel_id: ChannelId,
    pub message: Message,
}

impl Frame {
    pub fn new(channel_id: ChannelId, message: Message) -> Self {
        Self {
            channel_id,
            message,
        }
    }

    pub fn control(message: Message) -> Self {
        Self::new(ChannelId::CONTROL, message)
    }
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload(FrameHeader),
}

/// Length-prefixed bincode frames. See [`crate::frame`] for the header.
#[derive(Debug, Default)]
pub struct FrameCodec {
    state: DecodeState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let header = match std::mem::take(&mut self.state) {
            DecodeState::Payload(header) => header,
            DecodeState::Header => match FrameHeader::decode(src)? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        let len = header.payload_length as usize;
        if src.len() < len {
            src.reserve(len - src.len());
            self.state = DecodeState::Payload(header);
            return Ok(None);
        }

        let payload = src.split_to(len);
        let message: Message = bincode::deserialize(&payload)?;
        let carried = message.message_type();
        if carried != header.message_type {
            return Err(ProtocolError::TypeMismatch {
                header: header.message_type,
                payload: carried,
            });
        }

        Ok(Some(Frame::new(header.channel_id, message)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(&frame.message)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(
            frame.channel_id,
            frame.message.message_type(),
            payload.len() as u32,
        )
        .encode(dst);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
