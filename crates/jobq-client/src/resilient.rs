use crate::{retry_with, ClientError, Connector, QueueService, Result, RetryPolicy};
use async_trait::async_trait;
use jobq_core::{QueueStats, WorkItem};

/// Wraps a [`QueueService`] so every operation survives connection resets.
///
/// A call that fails with a transient error is repeated, with the same
/// arguments, according to the policy (by default 5 attempts, waiting 0, 1,
/// 2 and 3 seconds before the retries). Any other failure is returned as is.
///
/// No delay follows the last attempt, so with the default policy a call gives
/// up with [`ClientError::ConnectionExhausted`] 6 seconds after it started.
/// A 0, 1, 2, 3, 4 second schedule would report the same failure after 10
/// seconds; the attempts themselves happen at the same moments either way.
///
/// Retrying `get` is at-least-once: if the server handed out an item and the
/// answer was lost, the repeated call receives the next item and the lost
/// one stays with the server until it requeues it.
pub struct ResilientCaller<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: QueueService> ResilientCaller<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        ResilientCaller { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: QueueService> QueueService for ResilientCaller<S> {
    async fn get(&mut self) -> Result<Option<WorkItem>> {
        retry_with(
            &self.policy,
            "get",
            &mut self.inner,
            ClientError::is_transient,
            |conn| conn.get(),
        )
        .await
    }

    async fn done(&mut self, item: &WorkItem) -> Result<()> {
        retry_with(
            &self.policy,
            "done",
            &mut self.inner,
            ClientError::is_transient,
            |conn| {
                let item = item.clone();
                Box::pin(async move { conn.done(&item).await })
            },
        )
        .await
    }

    async fn error(&mut self, item: &WorkItem, message: &str) -> Result<()> {
        retry_with(
            &self.policy,
            "error",
            &mut self.inner,
            ClientError::is_transient,
            |conn| {
                let item = item.clone();
                let message = message.to_string();
                Box::pin(async move { conn.error(&item, &message).await })
            },
        )
        .await
    }

    async fn put(&mut self, item: &WorkItem) -> Result<()> {
        retry_with(
            &self.policy,
            "put",
            &mut self.inner,
            ClientError::is_transient,
            |conn| {
                let item = item.clone();
                Box::pin(async move { conn.put(&item).await })
            },
        )
        .await
    }

    async fn stat(&mut self) -> Result<QueueStats> {
        retry_with(
            &self.policy,
            "stat",
            &mut self.inner,
            ClientError::is_transient,
            |conn| conn.stat(),
        )
        .await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// Connector whose connections are [`ResilientCaller`]s
#[derive(Debug, Clone)]
pub struct ResilientConnector<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Connector> ResilientConnector<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        ResilientConnector { inner, policy }
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Connector> Connector for ResilientConnector<C> {
    type Conn = ResilientCaller<C::Conn>;

    async fn connect(&self) -> Result<Self::Conn> {
        let conn = self.inner.connect().await?;
        Ok(ResilientCaller::new(conn, self.policy))
    }
}
