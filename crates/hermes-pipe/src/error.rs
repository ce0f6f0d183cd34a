//! Error types for pipe operations.

use thiserror::Error;

/// Result type for pipe operations.
pub type PipeResult<T> = Result<T, PipeError>;

/// Errors that can occur on a pipe half.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// The pipe was completed cleanly; no further writes are accepted.
    #[error("the pipe is closed")]
    Closed,

    /// The pipe was completed with a terminal error by its peer.
    ///
    /// The payload is the terminating error's message, preserved verbatim so
    /// callers can surface the original failure.
    #[error("{0}")]
    Terminated(String),
}

impl PipeError {
    /// Create a terminated error from any displayable reason.
    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::Terminated(reason.into())
    }

    /// The terminating message, if this is a [`PipeError::Terminated`].
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Terminated(reason) => Some(reason),
            Self::Closed => None,
        }
    }
}
