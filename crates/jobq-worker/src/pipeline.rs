//! Generic staged execution over a stream.
//!
//! Each stage maps items through an async transform with a bounded number of
//! invocations in flight. Invocations run on their own tokio tasks, so a
//! stage with concurrency `n` uses up to `n` workers in parallel. The input
//! stream is only polled when the first stage has room for another item.

use crate::{Result, WorkerError};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

pub type Transform<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// One stage of a pipeline: a named transform and its concurrency limit
pub struct StageSpec<T> {
    name: String,
    concurrency: usize,
    transform: Transform<T>,
}

impl<T: Send + 'static> StageSpec<T> {
    /// A concurrency of 0 is treated as 1
    pub fn new<F, Fut>(name: impl Into<String>, concurrency: usize, transform: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        StageSpec {
            name: name.into(),
            concurrency: concurrency.max(1),
            transform: Arc::new(move |input| transform(input).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

pub struct PipelineRunner;

impl PipelineRunner {
    /// Drive `inputs` through `stages` until the input ends.
    ///
    /// Returns the number of items that left the last stage. The first error,
    /// whether it came from the input, a transform, or an aborted invocation,
    /// stops the run and is returned; the input stream is dropped with it.
    /// Items may leave a stage in a different order than they entered it.
    pub async fn run<T, S>(inputs: S, stages: Vec<StageSpec<T>>) -> Result<u64>
    where
        T: Send + 'static,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        let mut stream: BoxStream<'static, Result<T>> = inputs.boxed();

        for stage in stages {
            let StageSpec {
                name,
                concurrency,
                transform,
            } = stage;
            debug!("Stage '{}' with concurrency {}", name, concurrency);

            stream = stream
                .map(move |input| {
                    let transform = Arc::clone(&transform);
                    let name = name.clone();
                    async move {
                        let input = input?;
                        match tokio::spawn(transform(input)).await {
                            Ok(output) => output,
                            Err(e) => {
                                error!("Stage '{}' aborted: {}", name, e);
                                Err(WorkerError::StageAborted(name))
                            }
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .boxed();
        }

        let mut emitted = 0;
        while let Some(output) = stream.next().await {
            output?;
            emitted += 1;
        }
        Ok(emitted)
    }
}
