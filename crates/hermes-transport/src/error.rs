//! Error types for transport operations.

use hermes_pipe::PipeError;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while starting, running, or stopping a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// `start` was called with a requested format that is not a single bit.
    #[error("Invalid transfer mode. (Parameter 'requestedTransferMode')")]
    InvalidTransferMode,

    /// The transport could not be started.
    #[error("failed to start transport: {0}")]
    StartFailed(String),

    /// An HTTP-based transport received a non-success status code.
    #[error("response status code does not indicate success: {status}")]
    HttpStatus {
        /// The status code received.
        status: u16,
    },

    /// The operation was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The transport's internal loops terminated with an error.
    #[error("transport failure: {0}")]
    Failed(String),

    /// A pipe operation failed.
    #[error(transparent)]
    Pipe(#[from] PipeError),
}

impl TransportError {
    /// Create a start-failed error.
    pub fn start_failed(reason: impl Into<String>) -> Self {
        Self::StartFailed(reason.into())
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Create a generic transport failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Whether this is a 5xx HTTP status error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::HttpStatus { status } if (500..600).contains(status))
    }
}
