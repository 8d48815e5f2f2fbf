use crate::{ClientError, Connector, QueueService, QueueUri, Result};
use async_trait::async_trait;
use jobq_core::{QueueStats, WorkItem};
use jobq_protocol::{AckResponse, DoneRequest, ErrorRequest, Message, MessageCodec, PutRequest};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

type Transport = Framed<TcpStream, MessageCodec>;

/// One connection to a queue server.
///
/// The socket is opened eagerly by [`TcpConnection::connect`]. If an exchange
/// breaks the socket (reset, EOF, garbled frame) it is discarded and the next
/// call dials again, so a retry after a transient failure starts on a clean
/// stream.
pub struct TcpConnection {
    address: String,
    transport: Option<Transport>,
}

impl TcpConnection {
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let transport = dial(&address).await?;
        Ok(TcpConnection {
            address,
            transport: Some(transport),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    async fn request(&mut self, message: Message) -> Result<AckResponse> {
        let mut transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                debug!("Reconnecting to {}", self.address);
                dial(&self.address).await?
            }
        };

        let result = exchange(&mut transport, message).await;
        match &result {
            Err(e) if e.breaks_connection() => {
                debug!("Dropping connection to {}: {}", self.address, e);
            }
            _ => self.transport = Some(transport),
        }
        result
    }
}

async fn dial(address: &str) -> Result<Transport> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(stream, MessageCodec))
}

async fn exchange(transport: &mut Transport, message: Message) -> Result<AckResponse> {
    transport.send(message).await?;

    match transport.next().await {
        Some(Ok(Message::Ack(ack))) => Ok(ack),
        Some(Ok(Message::Nack(nack))) => Err(ClientError::ServerError(nack.error)),
        Some(Ok(_)) => Err(ClientError::UnexpectedResponse("request")),
        Some(Err(e)) => Err(e.into()),
        None => Err(ClientError::ConnectionClosed),
    }
}

#[async_trait]
impl QueueService for TcpConnection {
    async fn get(&mut self) -> Result<Option<WorkItem>> {
        Ok(self.request(Message::Get).await?.item)
    }

    async fn done(&mut self, item: &WorkItem) -> Result<()> {
        self.request(Message::Done(DoneRequest { item: item.clone() }))
            .await?;
        Ok(())
    }

    async fn error(&mut self, item: &WorkItem, message: &str) -> Result<()> {
        self.request(Message::Error(ErrorRequest {
            item: item.clone(),
            message: message.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn put(&mut self, item: &WorkItem) -> Result<()> {
        self.request(Message::Put(PutRequest { item: item.clone() }))
            .await?;
        Ok(())
    }

    async fn stat(&mut self) -> Result<QueueStats> {
        self.request(Message::Stat)
            .await?
            .stats
            .ok_or(ClientError::UnexpectedResponse("stat"))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}

/// Dials a fresh [`TcpConnection`] per `connect`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    uri: QueueUri,
}

impl TcpConnector {
    pub fn new(uri: QueueUri) -> Self {
        TcpConnector { uri }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(TcpConnector::new(QueueUri::parse(uri)?))
    }

    pub fn uri(&self) -> &QueueUri {
        &self.uri
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self) -> Result<TcpConnection> {
        TcpConnection::connect(self.uri.address()).await
    }
}
