use crate::{ProtocolError, Result, MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};
use work_queue_core::Envelope;

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    DeclareQueue = 1,
    DeclareReplyQueue = 2,
    DeleteQueue = 3,
    Publish = 4,
    Receive = 5,
    Ack = 6,
    Nack = 7,
    Delivery = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::DeclareQueue),
            2 => Some(MessageType::DeclareReplyQueue),
            3 => Some(MessageType::DeleteQueue),
            4 => Some(MessageType::Publish),
            5 => Some(MessageType::Receive),
            6 => Some(MessageType::Ack),
            7 => Some(MessageType::Nack),
            8 => Some(MessageType::Delivery),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages.
///
/// Every request gets exactly one response: `Ack`, `Nack`, or `Delivery`
/// for `Receive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Create a named queue (idempotent)
    DeclareQueue(DeclareQueueRequest),

    /// Create an exclusive reply queue owned by this connection
    DeclareReplyQueue(DeclareReplyQueueRequest),

    /// Remove a queue
    DeleteQueue(DeleteQueueRequest),

    /// Append an envelope to a queue
    Publish(PublishRequest),

    /// Take the next envelope from a queue, waiting up to a timeout
    Receive(ReceiveRequest),

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),

    /// Answer to `Receive`
    Delivery(DeliveryResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::DeclareQueue(_) => MessageType::DeclareQueue,
            Message::DeclareReplyQueue(_) => MessageType::DeclareReplyQueue,
            Message::DeleteQueue(_) => MessageType::DeleteQueue,
            Message::Publish(_) => MessageType::Publish,
            Message::Receive(_) => MessageType::Receive,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::Delivery(_) => MessageType::Delivery,
        }
    }

    /// Frame length (type byte plus payload), without serializing the message
    pub fn frame_len(&self) -> Result<usize> {
        let payload = match self {
            Message::DeclareQueue(req) => bincode::serialized_size(req)?,
            Message::DeclareReplyQueue(req) => bincode::serialized_size(req)?,
            Message::DeleteQueue(req) => bincode::serialized_size(req)?,
            Message::Publish(req) => bincode::serialized_size(req)?,
            Message::Receive(req) => bincode::serialized_size(req)?,
            Message::Ack(resp) => bincode::serialized_size(resp)?,
            Message::Nack(resp) => bincode::serialized_size(resp)?,
            Message::Delivery(resp) => bincode::serialized_size(resp)?,
        };
        Ok(1 + payload as usize)
    }

    /// Fails with [`ProtocolError::MessageTooLarge`] if the message cannot be framed
    pub fn check_size(&self) -> Result<()> {
        let length = self.frame_len()?;
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareQueueRequest {
    pub queue: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclareReplyQueueRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteQueueRequest {
    pub queue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub queue: String,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub queue: String,
    /// Milliseconds to wait; `None` blocks until an envelope arrives
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    /// Queue name, set when answering `DeclareReplyQueue`
    pub queue: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub kind: NackKind,
    pub error: String,
}

/// Failure category carried by a `Nack`, so clients can rebuild the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NackKind {
    QueueNotFound,
    QueueDeleted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub envelope: Option<Envelope>,
}
