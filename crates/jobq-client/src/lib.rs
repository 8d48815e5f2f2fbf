//! Client side of the jobq queue protocol.
//!
//! [`QueueService`] is the capability set a worker needs from the queue,
//! [`Connector`] opens fresh connections. [`TcpConnector`] talks to a real
//! server, [`MemoryQueue`] is an in-process stand-in, and
//! [`ResilientCaller`] / [`ResilientConnector`] add retry-on-reset to either.

mod memory;
mod resilient;
mod retry;
mod service;
mod tcp;
mod uri;

pub use memory::{MemoryConnection, MemoryQueue};
pub use resilient::{ResilientCaller, ResilientConnector};
pub use retry::{retry_with, Backoff, RetryPolicy};
pub use service::{Connector, QueueService};
pub use tcp::{TcpConnection, TcpConnector};
pub use uri::QueueUri;

use std::io::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid queue URI: {0}")]
    InvalidUri(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(jobq_protocol::ProtocolError),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error(transparent)]
    Core(#[from] jobq_core::CoreError),

    #[error("Connection exhausted: `{operation}` failed {attempts} times, last error: {source}")]
    ConnectionExhausted {
        operation: &'static str,
        attempts: u32,
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Reset-type failures that are safe to retry on a fresh connection
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            ClientError::ConnectionClosed => true,
            _ => false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, ClientError::ConnectionExhausted { .. })
    }

    /// Failures after which the underlying connection must not be reused
    pub(crate) fn breaks_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Protocol(_) | ClientError::ConnectionClosed
        )
    }
}

impl From<jobq_protocol::ProtocolError> for ClientError {
    fn from(err: jobq_protocol::ProtocolError) -> Self {
        match err {
            jobq_protocol::ProtocolError::IoError(e) => ClientError::Io(e),
            other => ClientError::Protocol(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
