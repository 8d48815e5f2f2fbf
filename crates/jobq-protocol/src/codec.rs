use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const LEN_PREFIX: usize = 4;

/// Length-prefixed frames: `[u32 BE length][u8 type][bincode payload]`.
///
/// The length covers the type byte and the payload. `Get` and `Stat` are
/// bare 5-byte frames.
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() <= LEN_PREFIX {
            return Ok(None);
        }

        let frame_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        match frame_len {
            0 => return Err(ProtocolError::EmptyFrame),
            n if n > MAX_MESSAGE_SIZE => return Err(ProtocolError::MessageTooLarge(n)),
            _ => {}
        }

        let needed = LEN_PREFIX + frame_len;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(needed);
        frame.advance(LEN_PREFIX);
        let tag = frame.get_u8();
        let kind = MessageType::from_u8(tag).ok_or(ProtocolError::InvalidMessageType(tag))?;
        let body = &frame[..];

        Ok(Some(match kind {
            MessageType::Get => Message::Get,
            MessageType::Stat => Message::Stat,
            MessageType::Done => Message::Done(bincode::deserialize(body)?),
            MessageType::Error => Message::Error(bincode::deserialize(body)?),
            MessageType::Put => Message::Put(bincode::deserialize(body)?),
            MessageType::Ack => Message::Ack(bincode::deserialize(body)?),
            MessageType::Nack => Message::Nack(bincode::deserialize(body)?),
        }))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        let body = match &message {
            Message::Get | Message::Stat => Vec::new(),
            Message::Done(req) => bincode::serialize(req)?,
            Message::Error(req) => bincode::serialize(req)?,
            Message::Put(req) => bincode::serialize(req)?,
            Message::Ack(resp) => bincode::serialize(resp)?,
            Message::Nack(resp) => bincode::serialize(resp)?,
        };

        let frame_len = body.len() + 1;
        if frame_len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(frame_len));
        }

        dst.reserve(LEN_PREFIX + frame_len);
        dst.put_u32(frame_len as u32);
        dst.put_u8(message.message_type().as_u8());
        dst.extend_from_slice(&body);
        Ok(())
    }
}
