//! Error types for server-side connection management.

use thiserror::Error;

/// Result type for server-side connection operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while managing server connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The peer reset the connection while it was being torn down.
    ///
    /// This class of failure is routine during disposal and is logged at
    /// debug severity.
    #[error("connection reset: {0}")]
    Reset(String),

    /// Disposal failed for a reason other than a peer reset.
    #[error("failed to dispose connection: {0}")]
    DisposeFailed(String),

    /// The manager has been closed and accepts no new connections.
    #[error("the connection manager is closed")]
    ManagerClosed,
}

impl ServerError {
    /// Create a reset error.
    pub fn reset(reason: impl Into<String>) -> Self {
        Self::Reset(reason.into())
    }

    /// Create a dispose-failed error.
    pub fn dispose_failed(reason: impl Into<String>) -> Self {
        Self::DisposeFailed(reason.into())
    }

    /// Whether this failure is a routine teardown-time reset.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_classification() {
        assert!(ServerError::reset("broken pipe").is_reset());
        assert!(!ServerError::dispose_failed("boom").is_reset());
        assert!(!ServerError::ManagerClosed.is_reset());
    }
}
