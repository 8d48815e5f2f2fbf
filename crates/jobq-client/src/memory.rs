//! In-process queue.
//!
//! [`MemoryQueue`] speaks the same [`QueueService`] surface as a remote
//! server, which makes it the natural backend for running handlers locally
//! and for exercising worker code in tests. Faults can be injected to mimic
//! connection resets and server rejections, and open connections are
//! counted so resource release can be observed.

use crate::{ClientError, Connector, QueueService, Result};
use async_trait::async_trait;
use jobq_core::{QueueStats, WorkItem};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

#[derive(Debug)]
enum Fault {
    Reset,
    Reject(String),
}

#[derive(Default)]
struct State {
    pending: VecDeque<WorkItem>,
    ongoing: Vec<WorkItem>,
    done: Vec<WorkItem>,
    errors: Vec<(WorkItem, String)>,
    error_counts: Vec<(WorkItem, u32)>,
    requeue_limit: u32,
    success: u64,
    backoff_success: u64,
    backoff_failure: u64,
    faults: VecDeque<Fault>,
    op_resets: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    open_connections: usize,
    connections_opened: usize,
}

impl State {
    fn enter(&mut self, operation: &'static str) -> Result<()> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(remaining) = self.op_resets.get_mut(operation).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(injected_reset());
        }
        match self.faults.pop_front() {
            None => Ok(()),
            Some(Fault::Reset) => Err(injected_reset()),
            Some(Fault::Reject(message)) => Err(ClientError::ServerError(message)),
        }
    }

    fn take_ongoing(&mut self, item: &WorkItem) {
        if let Some(pos) = self.ongoing.iter().position(|o| o == item) {
            self.ongoing.remove(pos);
        }
    }

    fn take_error_count(&mut self, item: &WorkItem) -> Option<u32> {
        let pos = self.error_counts.iter().position(|(i, _)| i == item)?;
        Some(self.error_counts.remove(pos).1)
    }
}

fn injected_reset() -> ClientError {
    ClientError::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "injected connection reset",
    ))
}

/// Shared handle to an in-process queue. Clones refer to the same queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        MemoryQueue::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let queue = MemoryQueue::new();
        queue.state.lock().pending.extend(items);
        queue
    }

    /// Requeue a failed item until it has failed `limit` times
    pub fn with_requeue_limit(self, limit: u32) -> Self {
        self.state.lock().requeue_limit = limit;
        self
    }

    pub fn push(&self, item: WorkItem) {
        self.state.lock().pending.push_back(item);
    }

    /// Fail the next `n` operations with a connection reset
    pub fn fail_next(&self, n: usize) {
        let mut state = self.state.lock();
        state.faults.extend((0..n).map(|_| Fault::Reset));
    }

    /// Fail the next `n` calls of one operation with a connection reset
    pub fn fail_op(&self, operation: &'static str, n: usize) {
        *self.state.lock().op_resets.entry(operation).or_default() += n;
    }

    /// Fail the next operation with a server-side rejection
    pub fn reject_next(&self, message: impl Into<String>) {
        self.state
            .lock()
            .faults
            .push_back(Fault::Reject(message.into()));
    }

    /// Open a connection synchronously
    pub fn open(&self) -> MemoryConnection {
        {
            let mut state = self.state.lock();
            state.open_connections += 1;
            state.connections_opened += 1;
        }
        MemoryConnection {
            queue: self.clone(),
            closed: false,
        }
    }

    pub fn done_items(&self) -> Vec<WorkItem> {
        self.state.lock().done.clone()
    }

    pub fn error_reports(&self) -> Vec<(WorkItem, String)> {
        self.state.lock().errors.clone()
    }

    pub fn pending(&self) -> Vec<WorkItem> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Number of times `operation` was invoked, failed attempts included
    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// Connections opened over the queue's lifetime
    pub fn connections_opened(&self) -> usize {
        self.state.lock().connections_opened
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            remain: state.pending.len() as u64,
            ongoing: state.ongoing.len() as u64,
            success: state.success,
            backoff_success: state.backoff_success,
            backoff_failure: state.backoff_failure,
            throughput: 0.0,
            eta_secs: 0.0,
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

#[async_trait]
impl Connector for MemoryQueue {
    type Conn = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        Ok(self.open())
    }
}

/// One open connection to a [`MemoryQueue`]
pub struct MemoryConnection {
    queue: MemoryQueue,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueService for MemoryConnection {
    async fn get(&mut self) -> Result<Option<WorkItem>> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock();
        state.enter("get")?;
        let item = state.pending.pop_front();
        if let Some(item) = &item {
            state.ongoing.push(item.clone());
        }
        Ok(item)
    }

    async fn done(&mut self, item: &WorkItem) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock();
        state.enter("done")?;
        state.take_ongoing(item);
        if state.take_error_count(item).is_some() {
            state.backoff_success += 1;
        }
        state.success += 1;
        state.done.push(item.clone());
        Ok(())
    }

    async fn error(&mut self, item: &WorkItem, message: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock();
        state.enter("error")?;
        state.take_ongoing(item);
        state.errors.push((item.clone(), message.to_string()));

        let failures = state.take_error_count(item).unwrap_or(0) + 1;
        if failures <= state.requeue_limit {
            state.error_counts.push((item.clone(), failures));
            state.pending.push_back(item.clone());
        } else {
            state.backoff_failure += 1;
        }
        Ok(())
    }

    async fn put(&mut self, item: &WorkItem) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.queue.state.lock();
        state.enter("put")?;
        state.pending.push_back(item.clone());
        Ok(())
    }

    async fn stat(&mut self) -> Result<QueueStats> {
        self.ensure_open()?;
        self.queue.state.lock().enter("stat")?;
        Ok(self.queue.stats())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.queue.release();
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.queue.release();
        }
    }
}
