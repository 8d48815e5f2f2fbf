use futures::{SinkExt, StreamExt};
use jobq_client::{MemoryQueue, QueueService, ResilientConnector, RetryPolicy, TcpConnector};
use jobq_core::WorkItem;
use jobq_protocol::{AckResponse, Message, MessageCodec, NackResponse};
use jobq_worker::{handler_fn, Handler, PipelinedWorker, SimpleRunner};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

/// Serve a [`MemoryQueue`] over the wire protocol, one queue connection per socket
async fn serve(queue: MemoryQueue) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mut conn = queue.open();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, MessageCodec);
                while let Some(Ok(request)) = framed.next().await {
                    let answer = match request {
                        Message::Get => conn.get().await.map(AckResponse::with_item),
                        Message::Done(req) => conn.done(&req.item).await.map(|_| AckResponse::empty()),
                        Message::Error(req) => conn
                            .error(&req.item, &req.message)
                            .await
                            .map(|_| AckResponse::empty()),
                        Message::Put(req) => conn.put(&req.item).await.map(|_| AckResponse::empty()),
                        Message::Stat => conn.stat().await.map(AckResponse::with_stats),
                        _ => continue,
                    };
                    let response = match answer {
                        Ok(ack) => Message::Ack(ack),
                        // Injected resets hang up, as a dropped connection would
                        Err(e) if e.is_transient() => break,
                        Err(e) => Message::Nack(NackResponse {
                            error: e.to_string(),
                        }),
                    };
                    if framed.send(response).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    address
}

fn connector(address: &str) -> ResilientConnector<TcpConnector> {
    ResilientConnector::new(
        TcpConnector::from_uri(address).unwrap(),
        RetryPolicy::linear(5, Duration::from_millis(10)),
    )
}

fn increment() -> Arc<dyn Handler> {
    Arc::new(handler_fn(|v| match v.as_i64() {
        Some(n) => Ok(json!(n + 1)),
        None => anyhow::bail!("expected a number"),
    }))
}

#[tokio::test]
async fn test_simple_runner_over_tcp() {
    let queue = MemoryQueue::with_items(vec![
        WorkItem::from(1),
        WorkItem::from("one"),
        WorkItem::from(2),
    ]);
    let address = serve(queue.clone()).await;

    let summary = SimpleRunner::new(connector(&address), increment())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(queue.done_items(), vec![WorkItem::from(1), WorkItem::from(2)]);

    let errors = queue.error_reports();
    assert_eq!(errors[0].0, WorkItem::from("one"));
    assert!(errors[0].1.contains("expected a number"));
}

#[tokio::test]
async fn test_pipelined_worker_over_tcp() {
    let mut items: Vec<WorkItem> = (0..20i64).map(WorkItem::from).collect();
    items.push(WorkItem::from("bad"));
    let queue = MemoryQueue::with_items(items);
    let address = serve(queue.clone()).await;

    let summary = PipelinedWorker::new(connector(&address))
        .stage("increment", 4, increment())
        .stage("again", 2, increment())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 20);
    assert_eq!(summary.failed, 1);

    let stats = queue.stats();
    assert_eq!(stats.success, 20);
    assert_eq!(stats.outstanding(), 0);

    let errors = queue.error_reports();
    assert_eq!(
        errors[0].1,
        "expected a number in stage 'increment' on \"bad\""
    );
}

#[tokio::test]
async fn test_resets_during_reporting_are_retried_over_tcp() {
    let queue = MemoryQueue::with_items(vec![WorkItem::from(7)]);
    queue.fail_op("done", 2);
    let address = serve(queue.clone()).await;

    let summary = PipelinedWorker::new(connector(&address))
        .stage("increment", 1, increment())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(queue.calls("done"), 3);
}
