use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("No handler registered for job kind: {0}")]
    UnknownHandler(String),

    #[error("Job manager is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
