use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, SharedError>;
