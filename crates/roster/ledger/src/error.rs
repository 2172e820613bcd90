use roster_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Concurrent update: {0}")]
    Conflict(String),

    #[error("Action log chain broken at sequence {sequence}: {detail}")]
    ChainBroken { sequence: u64, detail: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::AlreadyExists(msg) => Self::AlreadyExists(msg),
            err @ StorageError::Conflict { .. } => Self::Conflict(err.to_string()),
            StorageError::Unavailable(msg) => Self::Unavailable(msg),
            StorageError::InvalidInput(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => Self::Backend(msg),
        }
    }
}
