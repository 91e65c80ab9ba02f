use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("an active job already exists for process {0}")]
    ActiveJobExists(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] crate::status::TransitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
