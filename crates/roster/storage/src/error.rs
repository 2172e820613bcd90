use roster_types::RecordVersion;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("version conflict on {record}: expected {expected}, found {found}")]
    Conflict {
        record: String,
        expected: RecordVersion,
        found: RecordVersion,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
