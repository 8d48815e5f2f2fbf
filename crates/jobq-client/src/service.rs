use crate::Result;
use async_trait::async_trait;
use jobq_core::{QueueStats, WorkItem};

/// Operations a worker can perform against the queue over one connection.
///
/// Each method is a single request/response exchange. Implementations own
/// their connection; dropping the value releases it.
#[async_trait]
pub trait QueueService: Send {
    /// Next item, or `None` once the queue has no more work
    async fn get(&mut self) -> Result<Option<WorkItem>>;

    async fn done(&mut self, item: &WorkItem) -> Result<()>;

    async fn error(&mut self, item: &WorkItem, message: &str) -> Result<()>;

    async fn put(&mut self, item: &WorkItem) -> Result<()>;

    async fn stat(&mut self) -> Result<QueueStats>;

    /// Release the connection eagerly. Dropping without calling this is fine.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens fresh connections to the same queue
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: QueueService + 'static;

    async fn connect(&self) -> Result<Self::Conn>;
}
