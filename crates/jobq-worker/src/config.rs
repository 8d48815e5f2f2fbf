use crate::{Result, WorkerError};
use jobq_client::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue server address, `tcp://host:port`
    pub uri: String,
    /// Per-call retry of every queue operation
    pub retry: RetryConfig,
    /// Per-pull retry of the work source on top of `retry`
    pub source_retry: SourceRetryConfig,
    /// Concurrent reporters at the end of a pipeline
    pub report_concurrency: usize,
    /// Handler invocations running longer than this fail the item
    pub handler_timeout_secs: Option<u64>,
    /// Handler used in simple mode
    pub handler: String,
    /// Stages used in pipeline mode, in order
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub handler: String,
    #[serde(default = "default_stage_concurrency")]
    pub concurrency: usize,
}

fn default_stage_concurrency() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            uri: format!("tcp://127.0.0.1:{}", jobq_core::DEFAULT_PORT),
            retry: RetryConfig::default(),
            source_retry: SourceRetryConfig::default(),
            report_concurrency: 2,
            handler_timeout_secs: None,
            handler: "echo".to_string(),
            stages: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            backoff_step_ms: 1000,
        }
    }
}

impl Default for SourceRetryConfig {
    fn default() -> Self {
        SourceRetryConfig {
            max_attempts: 5,
            delay_ms: 500,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.backoff_step_ms),
        )
    }

    pub fn source_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.source_retry.max_attempts,
            Duration::from_millis(self.source_retry.delay_ms),
        )
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }
}

impl StageConfig {
    /// Parse `NAME` or `NAME=CONCURRENCY`
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || WorkerError::InvalidStage(spec.to_string());

        let (handler, concurrency) = match spec.split_once('=') {
            Some((handler, n)) => {
                let n = n.trim().parse::<usize>().map_err(|_| invalid())?;
                (handler.trim(), n)
            }
            None => (spec.trim(), default_stage_concurrency()),
        };

        if handler.is_empty() || concurrency == 0 {
            return Err(invalid());
        }

        Ok(StageConfig {
            handler: handler.to_string(),
            concurrency,
        })
    }
}
