use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Need at least 5 bytes for length prefix + message type
        if src.len() < 5 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        // The length always covers at least the type byte
        if length == 0 {
            return Err(ProtocolError::InvalidMessageType(src[4]));
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);

        let msg_type_byte = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type_byte)
            .ok_or(ProtocolError::InvalidMessageType(msg_type_byte))?;

        let payload = src.split_to(length - 1);

        let message = match msg_type {
            MessageType::DeclareQueue => Message::DeclareQueue(bincode::deserialize(&payload)?),
            MessageType::DeclareReplyQueue => {
                Message::DeclareReplyQueue(bincode::deserialize(&payload)?)
            }
            MessageType::DeleteQueue => Message::DeleteQueue(bincode::deserialize(&payload)?),
            MessageType::Publish => Message::Publish(bincode::deserialize(&payload)?),
            MessageType::Receive => Message::Receive(bincode::deserialize(&payload)?),
            MessageType::Ack => Message::Ack(bincode::deserialize(&payload)?),
            MessageType::Nack => Message::Nack(bincode::deserialize(&payload)?),
            MessageType::Delivery => Message::Delivery(bincode::deserialize(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::DeclareQueue(req) => bincode::serialize(req)?,
            Message::DeclareReplyQueue(req) => bincode::serialize(req)?,
            Message::DeleteQueue(req) => bincode::serialize(req)?,
            Message::Publish(req) => bincode::serialize(req)?,
            Message::Receive(req) => bincode::serialize(req)?,
            Message::Ack(resp) => bincode::serialize(resp)?,
            Message::Nack(resp) => bincode::serialize(resp)?,
            Message::Delivery(resp) => bincode::serialize(resp)?,
        };

        let total_length = 1 + payload.len(); // message type + payload
        if total_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeclareReplyQueueRequest, DeliveryResponse, PublishRequest, ReceiveRequest};
    use work_queue_core::{CorrelationId, Envelope, Task};

    fn publish_message() -> (Task, CorrelationId, Message) {
        let task = Task::new("test", b"test payload".to_vec()).unwrap();
        let correlation_id = CorrelationId::new();
        let envelope = Envelope::for_task_with_reply(&task, correlation_id, "reply.abc").unwrap();
        let message = Message::Publish(PublishRequest {
            queue: "work".to_string(),
            envelope,
        });
        (task, correlation_id, message)
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        let (task, correlation_id, message) = publish_message();

        codec.encode(message, &mut buffer).unwrap();
        let decoded = codec.decode(&mut buffer).unwrap();

        match decoded {
            Some(Message::Publish(req)) => {
                assert_eq!(req.queue, "work");
                assert!(req.envelope.matches(&correlation_id));
                assert_eq!(req.envelope.reply_to(), Some("reply.abc"));
                assert_eq!(req.envelope.decode_task().unwrap(), task);
            }
            other => panic!("Wrong message: {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_message() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        let (_, _, message) = publish_message();

        codec.encode(message, &mut buffer).unwrap();

        let full_len = buffer.len();
        let partial = buffer.split_to(full_len / 2);
        let mut partial_buffer = BytesMut::from(&partial[..]);

        let result = codec.decode(&mut partial_buffer).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        codec
            .encode(Message::DeclareReplyQueue(DeclareReplyQueueRequest {}), &mut buffer)
            .unwrap();
        codec
            .encode(
                Message::Receive(ReceiveRequest {
                    queue: "work".to_string(),
                    timeout_ms: Some(250),
                }),
                &mut buffer,
            )
            .unwrap();
        codec
            .encode(Message::Delivery(DeliveryResponse { envelope: None }), &mut buffer)
            .unwrap();

        assert!(matches!(
            codec.decode(&mut buffer).unwrap(),
            Some(Message::DeclareReplyQueue(_))
        ));
        match codec.decode(&mut buffer).unwrap() {
            Some(Message::Receive(req)) => assert_eq!(req.timeout_ms, Some(250)),
            other => panic!("Wrong message: {:?}", other),
        }
        assert!(matches!(
            codec.decode(&mut buffer).unwrap(),
            Some(Message::Delivery(DeliveryResponse { envelope: None }))
        ));
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unknown_message_type() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        buffer.put_u32(1);
        buffer.put_u8(42);

        match codec.decode(&mut buffer) {
            Err(ProtocolError::InvalidMessageType(42)) => {}
            other => panic!("Expected InvalidMessageType, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        buffer.put_u32((MAX_MESSAGE_SIZE + 1) as u32);
        buffer.put_u8(MessageType::Publish.as_u8());

        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }
}
