use approvals_types::RoutingError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for RoutingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => RoutingError::NotFound(msg),
            StorageError::Conflict(msg) | StorageError::InvariantViolation(msg) => {
                RoutingError::Conflict(msg)
            }
            StorageError::InvalidInput(msg) => RoutingError::Validation(msg),
            StorageError::Serialization(msg) | StorageError::Backend(msg) => {
                RoutingError::Dependency(msg)
            }
        }
    }
}
