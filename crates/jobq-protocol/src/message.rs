use jobq_core::{QueueStats, WorkItem};
use serde::{Deserialize, Serialize};

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Get = 1,
    Done = 2,
    Error = 3,
    Put = 4,
    Stat = 5,
    Ack = 6,
    Nack = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Get),
            2 => Some(MessageType::Done),
            3 => Some(MessageType::Error),
            4 => Some(MessageType::Put),
            5 => Some(MessageType::Stat),
            6 => Some(MessageType::Ack),
            7 => Some(MessageType::Nack),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages. Every request is answered by exactly one `Ack` or `Nack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Fetch the next work item
    Get,

    /// Item finished successfully
    Done(DoneRequest),

    /// Item failed
    Error(ErrorRequest),

    /// Enqueue a new item
    Put(PutRequest),

    /// Query queue statistics
    Stat,

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Get => MessageType::Get,
            Message::Done(_) => MessageType::Done,
            Message::Error(_) => MessageType::Error,
            Message::Put(_) => MessageType::Put,
            Message::Stat => MessageType::Stat,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneRequest {
    pub item: WorkItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRequest {
    pub item: WorkItem,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub item: WorkItem,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    /// Item handed out by `Get`; `None` is the end-of-work sentinel
    pub item: Option<WorkItem>,
    /// Statistics answered to `Stat`
    pub stats: Option<QueueStats>,
}

impl AckResponse {
    pub fn empty() -> Self {
        AckResponse::default()
    }

    pub fn with_item(item: Option<WorkItem>) -> Self {
        AckResponse { item, stats: None }
    }

    pub fn with_stats(stats: QueueStats) -> Self {
        AckResponse {
            item: None,
            stats: Some(stats),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub error: String,
}
