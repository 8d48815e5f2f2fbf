//! Wire format shared by queue servers and clients.
//!
//! Every exchange is one request frame answered by one `Ack` or `Nack`
//! frame, see [`MessageCodec`] for the framing.

mod codec;
mod message;

pub use codec::MessageCodec;
pub use message::{
    AckResponse, DoneRequest, ErrorRequest, Message, MessageType, NackResponse, PutRequest,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message type {0}")]
    InvalidMessageType(u8),

    #[error("Frame without message type")]
    EmptyFrame,

    #[error("Frame of {0} bytes exceeds the size limit")]
    MessageTooLarge(usize),

    #[error("Payload encoding error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Largest accepted frame (type byte plus payload), 11 MiB
pub const MAX_MESSAGE_SIZE: usize = 11 * 1024 * 1024;
