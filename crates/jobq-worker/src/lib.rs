//! Worker side of jobq: pull items from a queue, process them, report back.
//!
//! - [`SimpleRunner`] runs one handler over items pulled one at a time.
//! - [`PipelinedWorker`] streams items from a [`WorkSource`] through a chain
//!   of concurrency-bounded stages on top of [`PipelineRunner`], then reports
//!   each item with its own connection.

pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod pipeline;
pub mod pipelined;
pub mod runner;
pub mod source;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use executor::HandlerExecutor;
pub use handler::{handler_fn, Handler, HandlerRegistry, HandlerResult};
pub use pipeline::{PipelineRunner, StageSpec};
pub use pipelined::{PipelineRecord, PipelineSummary, PipelinedWorker, StageFailure};
pub use runner::{RunSummary, SimpleRunner};
pub use source::WorkSource;
