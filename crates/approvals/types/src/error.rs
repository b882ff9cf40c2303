use thiserror::Error;

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Routing engine errors.
///
/// Every operation fails into exactly one of these. Only `Conflict` is
/// retryable, and the caller should re-fetch current state first. Side-effect
/// failures (`Dependency`) never roll back a committed state transition.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl RoutingError {
    /// Whether the caller may retry after re-fetching current state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
