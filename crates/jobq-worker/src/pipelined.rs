use crate::pipeline::{PipelineRunner, StageSpec};
use crate::{Handler, HandlerExecutor, Result, WorkSource, WorkerError};
use futures::StreamExt;
use jobq_client::{Connector, QueueService, RetryPolicy};
use jobq_core::WorkItem;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a record stopped being processed
#[derive(Debug)]
pub struct StageFailure {
    pub stage: String,
    pub error: anyhow::Error,
}

/// An item travelling through the pipeline.
///
/// `payload` starts as the item's value and is replaced by each successful
/// stage. Once a stage fails the record is frozen: later stages pass it on
/// untouched, and `payload` remains the input the failing stage received.
#[derive(Debug)]
pub struct PipelineRecord {
    pub item: WorkItem,
    pub payload: Value,
    pub failure: Option<StageFailure>,
}

impl PipelineRecord {
    pub fn new(item: WorkItem) -> Self {
        let payload = item.value().clone();
        PipelineRecord {
            item,
            payload,
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Description sent to the queue for a failed record
    pub fn failure_message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| {
            format!("{:#} in stage '{}' on {}", f.error, f.stage, self.payload)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub completed: u64,
    pub failed: u64,
}

struct Stage {
    name: String,
    concurrency: usize,
    handler: Arc<dyn Handler>,
}

/// Streams items from one [`WorkSource`] through a chain of handler stages
/// and reports every item back to the queue.
///
/// A failing handler marks the record but never stops the pipeline.
/// Reporting opens a fresh connection per record, with up to
/// `report_concurrency` reports in flight. A reporting or pulling failure
/// that survives the connector's retries ends the run.
pub struct PipelinedWorker<C> {
    connector: Arc<C>,
    stages: Vec<Stage>,
    source_policy: RetryPolicy,
    report_concurrency: usize,
    handler_timeout: Option<Duration>,
}

impl<C: Connector + 'static> PipelinedWorker<C> {
    pub fn new(connector: C) -> Self {
        PipelinedWorker {
            connector: Arc::new(connector),
            stages: Vec::new(),
            source_policy: RetryPolicy::work_source(),
            report_concurrency: 2,
            handler_timeout: None,
        }
    }

    /// Append a stage running `handler` with up to `concurrency` invocations in flight
    pub fn stage(
        mut self,
        name: impl Into<String>,
        concurrency: usize,
        handler: Arc<dyn Handler>,
    ) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            concurrency,
            handler,
        });
        self
    }

    pub fn source_policy(mut self, policy: RetryPolicy) -> Self {
        self.source_policy = policy;
        self
    }

    pub fn report_concurrency(mut self, concurrency: usize) -> Self {
        self.report_concurrency = concurrency;
        self
    }

    pub fn handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub async fn run(&self) -> Result<PipelineSummary> {
        let source = WorkSource::open(self.connector.as_ref(), self.source_policy).await?;
        let records = source
            .into_stream()
            .map(|pulled| pulled.map(PipelineRecord::new).map_err(WorkerError::from));

        let mut stages: Vec<StageSpec<PipelineRecord>> = self
            .stages
            .iter()
            .map(|stage| wrap_stage(stage, self.handler_timeout))
            .collect();

        let completed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        stages.push(self.report_stage(Arc::clone(&completed), Arc::clone(&failed)));

        info!(
            "Pipeline started with {} stages, reporting with concurrency {}",
            self.stages.len(),
            self.report_concurrency
        );
        let reported = PipelineRunner::run(records, stages).await?;

        let summary = PipelineSummary {
            completed: completed.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        info!(
            "Pipeline finished: {} reported, {} completed, {} failed",
            reported, summary.completed, summary.failed
        );
        Ok(summary)
    }

    fn report_stage(
        &self,
        completed: Arc<AtomicU64>,
        failed: Arc<AtomicU64>,
    ) -> StageSpec<PipelineRecord> {
        let connector = Arc::clone(&self.connector);
        StageSpec::new("report", self.report_concurrency, move |record: PipelineRecord| {
            let connector = Arc::clone(&connector);
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            async move {
                report(connector.as_ref(), &record).await?;
                let counter = if record.is_failed() { &failed } else { &completed };
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(record)
            }
        })
    }
}

fn wrap_stage(stage: &Stage, timeout: Option<Duration>) -> StageSpec<PipelineRecord> {
    let executor = Arc::new(HandlerExecutor::new(Arc::clone(&stage.handler)).with_timeout(timeout));
    let name = stage.name.clone();

    StageSpec::new(stage.name.clone(), stage.concurrency, move |record: PipelineRecord| {
        let executor = Arc::clone(&executor);
        let name = name.clone();
        async move { Ok(apply_stage(&name, &executor, record).await) }
    })
}

/// Run one stage on a record. Failed records are returned unchanged.
pub async fn apply_stage(
    stage: &str,
    executor: &HandlerExecutor,
    mut record: PipelineRecord,
) -> PipelineRecord {
    if record.is_failed() {
        return record;
    }

    match executor.execute(record.payload.clone()).await {
        Ok(output) => record.payload = output,
        Err(error) => {
            warn!("Stage '{}' failed on {}: {:#}", stage, record.payload, error);
            record.failure = Some(StageFailure {
                stage: stage.to_string(),
                error,
            });
        }
    }
    record
}

/// Report a record's outcome over a fresh connection.
///
/// Not idempotent: reporting the same record twice calls the queue twice.
pub async fn report<C: Connector + ?Sized>(connector: &C, record: &PipelineRecord) -> Result<()> {
    let mut conn = connector.connect().await?;

    match record.failure_message() {
        None => {
            debug!("Reporting done for {}", record.item);
            conn.done(&record.item).await?;
        }
        Some(message) => {
            debug!("Reporting error for {}: {}", record.item, message);
            conn.error(&record.item, &message).await?;
        }
    }

    if let Err(e) = conn.close().await {
        warn!("Failed to close report connection: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, SleepHandler};
    use anyhow::Context;
    use async_trait::async_trait;
    use jobq_client::{ClientError, MemoryConnection, MemoryQueue, ResilientConnector};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Connector that takes `hold` to establish each connection and records
    /// how many connection attempts were pending at once
    struct SlowConnector {
        queue: MemoryQueue,
        hold: Duration,
        connecting: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowConnector {
        fn new(queue: MemoryQueue, hold: Duration) -> Self {
            SlowConnector {
                queue,
                hold,
                connecting: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for SlowConnector {
        type Conn = MemoryConnection;

        async fn connect(&self) -> jobq_client::Result<MemoryConnection> {
            let now = self.connecting.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.connecting.fetch_sub(1, Ordering::SeqCst);
            Ok(self.queue.open())
        }
    }

    fn double() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|v| {
            let n = v.as_i64().context("not a number")?;
            Ok(json!(n * 2))
        }))
    }

    fn negate() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|v| {
            let n = v.as_i64().context("not a number")?;
            Ok(json!(-n))
        }))
    }

    fn capture(into: Arc<Mutex<Vec<Value>>>) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |v| {
            into.lock().push(v.clone());
            Ok(v)
        }))
    }

    fn reject_three() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|v| {
            if v == json!(3) {
                anyhow::bail!("three is not allowed");
            }
            Ok(v)
        }))
    }

    #[tokio::test]
    async fn test_stages_chain_and_item_is_reported_done() {
        let queue = MemoryQueue::with_items(vec![WorkItem::from(5)]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = PipelinedWorker::new(queue.clone())
            .stage("double", 2, double())
            .stage("negate", 1, negate())
            .stage("capture", 1, capture(Arc::clone(&seen)))
            .run()
            .await
            .unwrap();

        assert_eq!(summary, PipelineSummary { completed: 1, failed: 0 });
        assert_eq!(*seen.lock(), vec![json!(-10)]);
        assert_eq!(queue.done_items(), vec![WorkItem::from(5)]);
        assert!(queue.error_reports().is_empty());
        assert_eq!(queue.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_sticky_and_reported_with_stage() {
        let queue = MemoryQueue::with_items((1..=4i64).map(WorkItem::from));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = PipelinedWorker::new(queue.clone())
            .stage("check", 2, reject_three())
            .stage("after", 1, capture(Arc::clone(&seen)))
            .run()
            .await
            .unwrap();

        assert_eq!(summary, PipelineSummary { completed: 3, failed: 1 });

        let mut after = seen.lock().clone();
        after.sort_by_key(|v| v.as_i64());
        assert_eq!(after, vec![json!(1), json!(2), json!(4)]);

        let errors = queue.error_reports();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, WorkItem::from(3));
        assert_eq!(errors[0].1, "three is not allowed in stage 'check' on 3");
        assert_eq!(queue.done_items().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_stage_keeps_its_input_payload() {
        let queue = MemoryQueue::with_items(vec![WorkItem::from(5)]);
        let fail = Arc::new(handler_fn(|_| anyhow::bail!("rejected")));

        PipelinedWorker::new(queue.clone())
            .stage("double", 1, double())
            .stage("reject", 1, fail)
            .stage("negate", 1, negate())
            .run()
            .await
            .unwrap();

        let errors = queue.error_reports();
        assert_eq!(errors[0].1, "rejected in stage 'reject' on 10");
    }

    #[tokio::test]
    async fn test_apply_stage_skips_failed_records() {
        let executor = HandlerExecutor::new(double());
        let mut record = PipelineRecord::new(WorkItem::from(4));

        record = apply_stage("double", &executor, record).await;
        assert_eq!(record.payload, json!(8));

        record.failure = Some(StageFailure {
            stage: "earlier".to_string(),
            error: anyhow::anyhow!("bad"),
        });
        record = apply_stage("double", &executor, record).await;

        assert_eq!(record.payload, json!(8));
        assert_eq!(
            record.failure_message().unwrap(),
            "bad in stage 'earlier' on 8"
        );
    }

    #[tokio::test]
    async fn test_reporting_twice_calls_done_twice() {
        let queue = MemoryQueue::new();
        let record = PipelineRecord::new(WorkItem::from("A"));

        report(&queue, &record).await.unwrap();
        report(&queue, &record).await.unwrap();

        assert_eq!(queue.done_items(), vec![WorkItem::from("A"), WorkItem::from("A")]);
        assert_eq!(queue.connections_opened(), 2);
        assert_eq!(queue.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_report_opens_its_own_connection() {
        let queue = MemoryQueue::with_items((1..=6i64).map(WorkItem::from));
        let connector = SlowConnector::new(queue.clone(), Duration::from_millis(50));
        let worker = PipelinedWorker::new(connector).stage("double", 3, double());

        let summary = worker.run().await.unwrap();

        assert_eq!(summary.completed, 6);
        // One connection for the source, then one per reported item
        assert_eq!(queue.connections_opened(), 7);
        // Reports run two at a time by default
        assert_eq!(worker.connector.peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_concurrency_is_configurable() {
        let queue = MemoryQueue::with_items((1..=9i64).map(WorkItem::from));
        let connector = SlowConnector::new(queue.clone(), Duration::from_millis(50));
        let worker = PipelinedWorker::new(connector).report_concurrency(3);

        let summary = worker.run().await.unwrap();

        assert_eq!(summary.completed, 9);
        assert_eq!(queue.connections_opened(), 10);
        assert_eq!(worker.connector.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporting_exhaustion_aborts_the_run() {
        let queue = MemoryQueue::with_items(vec![WorkItem::from(1)]);
        queue.fail_op("done", 5);
        let connector = ResilientConnector::new(
            queue.clone(),
            RetryPolicy::linear(5, Duration::from_millis(1)),
        );

        let err = PipelinedWorker::new(connector)
            .stage("double", 1, double())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::Client(ClientError::ConnectionExhausted { operation: "done", attempts: 5, .. })
        ));
        assert_eq!(queue.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_the_run() {
        let queue = MemoryQueue::with_items(vec![WorkItem::from(1)]);
        queue.reject_next("queue is paused");

        let err = PipelinedWorker::new(queue.clone())
            .stage("double", 1, double())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Client(ClientError::ServerError(_))));
        assert!(queue.done_items().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_fails_the_record() {
        let queue = MemoryQueue::with_items(vec![WorkItem::from("slow")]);

        let summary = PipelinedWorker::new(queue.clone())
            .stage("sleep", 1, Arc::new(SleepHandler::new(10_000)))
            .handler_timeout(Some(Duration::from_secs(1)))
            .report_concurrency(1)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        let errors = queue.error_reports();
        assert!(errors[0].1.contains("timed out"));
        assert!(errors[0].1.ends_with("in stage 'sleep' on \"slow\""));
    }

    #[tokio::test]
    async fn test_empty_pipeline_reports_every_item() {
        let queue = MemoryQueue::with_items((1..=6i64).map(WorkItem::from));

        let summary = PipelinedWorker::new(queue.clone())
            .report_concurrency(3)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.completed, 6);
        assert_eq!(queue.stats().success, 6);
        assert_eq!(queue.stats().ongoing, 0);
    }
}
