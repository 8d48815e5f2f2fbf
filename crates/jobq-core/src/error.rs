use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Work item cannot be null (null is the end-of-work sentinel)")]
    NullItem,

    #[error("Invalid work item JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
