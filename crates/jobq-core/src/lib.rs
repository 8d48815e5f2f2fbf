mod error;
mod item;
mod stats;

pub use error::{CoreError, Result};
pub use item::WorkItem;
pub use stats::QueueStats;

/// Default TCP port of the queue server
pub const DEFAULT_PORT: u16 = 9105;
