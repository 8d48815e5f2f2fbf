use crate::{Handler, HandlerExecutor, Result};
use jobq_client::{Connector, QueueService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Outcome of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
}

impl RunSummary {
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Pulls items one at a time over a single connection and reports each
/// result before asking for the next one.
pub struct SimpleRunner<C> {
    connector: C,
    executor: HandlerExecutor,
}

impl<C: Connector> SimpleRunner<C> {
    pub fn new(connector: C, handler: Arc<dyn Handler>) -> Self {
        SimpleRunner {
            connector,
            executor: HandlerExecutor::new(handler),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor = self.executor.with_timeout(timeout);
        self
    }

    /// Run until the queue is drained. Handler failures are reported to the
    /// queue and counted; connection failures end the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut conn = self.connector.connect().await?;
        let mut summary = RunSummary::default();
        info!("Simple runner started");

        while let Some(item) = conn.get().await? {
            debug!("Processing {}", item);

            match self.executor.execute(item.value().clone()).await {
                Ok(_) => {
                    conn.done(&item).await?;
                    summary.completed += 1;
                }
                Err(e) => {
                    error!("Handler failed on {}: {:#}", item, e);
                    conn.error(&item, &format!("{e:#}")).await?;
                    summary.failed += 1;
                }
            }
        }

        conn.close().await?;
        info!(
            "Queue drained: {} completed, {} failed",
            summary.completed, summary.failed
        );
        Ok(summary)
    }
}
