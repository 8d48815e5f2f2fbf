use serde::{Deserialize, Serialize};

/// Queue-wide counters reported by the `stat` operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items still waiting to be handed out
    pub remain: u64,
    /// Items handed out and not yet reported
    pub ongoing: u64,
    /// Items reported done
    pub success: u64,
    /// Items that succeeded after at least one reported error
    pub backoff_success: u64,
    /// Items dropped after exhausting their error budget
    pub backoff_failure: u64,
    /// Items completed per second over the server's sampling window
    pub throughput: f64,
    /// Estimated seconds until the queue drains (0 when unknown)
    pub eta_secs: f64,
}

impl QueueStats {
    /// Items the queue still has to see through (waiting or in flight)
    pub fn outstanding(&self) -> u64 {
        self.remain + self.ongoing
    }
}
