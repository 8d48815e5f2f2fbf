use jobq_client::{retry_with, ClientError, Connector, QueueService, Result, RetryPolicy};
use jobq_core::WorkItem;

use futures::Stream;
use tracing::{debug, info, warn};

/// Lazy, finite sequence of work items pulled from one connection.
///
/// Each [`next`](WorkSource::next) issues a single `get`, retried per the
/// pull policy when the connection fails transiently (including an inner
/// [`ResilientCaller`](jobq_client::ResilientCaller) giving up). Nothing is
/// fetched ahead of the consumer.
///
/// The connection is owned for the lifetime of the source and released as
/// soon as the queue signals end of work, on [`close`](WorkSource::close), or
/// when the source is dropped half way through.
pub struct WorkSource<S> {
    conn: Option<S>,
    policy: RetryPolicy,
    pulled: u64,
}

impl<S: QueueService + 'static> WorkSource<S> {
    pub fn new(conn: S, policy: RetryPolicy) -> Self {
        WorkSource {
            conn: Some(conn),
            policy,
            pulled: 0,
        }
    }

    /// Open a dedicated connection and wrap it
    pub async fn open<C>(connector: &C, policy: RetryPolicy) -> Result<Self>
    where
        C: Connector<Conn = S> + ?Sized,
    {
        let conn = connector.connect().await?;
        Ok(WorkSource::new(conn, policy))
    }

    /// Next item, or `None` once the queue has no more work
    pub async fn next(&mut self) -> Result<Option<WorkItem>> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(None);
        };

        let item = retry_with(&self.policy, "get", conn, is_pull_retryable, |c| c.get()).await?;

        match item {
            Some(item) => {
                self.pulled += 1;
                debug!("Pulled item #{}: {}", self.pulled, item);
                Ok(Some(item))
            }
            None => {
                info!("Queue drained after {} items", self.pulled);
                if let Err(e) = self.close().await {
                    warn!("Failed to close work source connection: {}", e);
                }
                Ok(None)
            }
        }
    }

    /// Release the connection; later pulls yield `None`
    pub async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(mut conn) => conn.close().await,
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.conn.is_none()
    }

    /// Items handed out so far
    pub fn pulled(&self) -> u64 {
        self.pulled
    }

    /// Adapt to a [`Stream`]. The stream ends after the sentinel or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<WorkItem>> + Send + 'static {
        futures::stream::try_unfold(self, |mut source| async move {
            let item = source.next().await?;
            Ok::<_, ClientError>(item.map(|item| (item, source)))
        })
    }
}

fn is_pull_retryable(e: &ClientError) -> bool {
    e.is_transient() || e.is_exhausted()
}
