use thiserror::Error;

pub type LearnResult<T> = Result<T, LearnError>;

#[derive(Error, Debug)]
pub enum LearnError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Discretization fingerprint mismatch: checkpoint was trained with {stored}, active configuration is {active}")]
    FingerprintMismatch { stored: String, active: String },

    #[error("Ingestion queue is full")]
    Backpressure,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
