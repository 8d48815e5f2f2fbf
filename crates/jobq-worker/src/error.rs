use jobq_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Stage `{0}` panicked or was cancelled")]
    StageAborted(String),

    #[error("No handler registered under `{0}`")]
    UnknownHandler(String),

    #[error("Invalid stage `{0}`: expected NAME or NAME=CONCURRENCY")]
    InvalidStage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
