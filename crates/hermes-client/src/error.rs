//! Error types for the connection core and hub layer.

use hermes_pipe::PipeError;
use hermes_protocol::ProtocolError;
use hermes_transport::TransportError;
use thiserror::Error;

/// Result type for connection operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors produced by [`ClientConnection`](crate::ClientConnection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The operation is not legal in the connection's current state.
    ///
    /// The message text is part of the public contract and is matched by
    /// callers; see [`invalid_start_state`](ClientError::invalid_start_state)
    /// and [`invalid_send_state`](ClientError::invalid_send_state).
    #[error("{0}")]
    InvalidState(String),

    /// The underlying transport or pipe terminated with the carried error.
    #[error("{0}")]
    ConnectionTerminated(String),

    /// A transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A pipe operation failed.
    #[error(transparent)]
    Pipe(#[from] PipeError),
}

impl ClientError {
    /// The error returned by `start` when the connection is not
    /// `Disconnected`.
    pub fn invalid_start_state() -> Self {
        Self::InvalidState(
            "Cannot start a connection that is not in the Disconnected state.".to_owned(),
        )
    }

    /// The error returned by `send` when the connection is not `Connected`.
    pub fn invalid_send_state() -> Self {
        Self::InvalidState(
            "Cannot send messages when the connection is not in the Connected state.".to_owned(),
        )
    }

    /// Create a connection-terminated error preserving the original message.
    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::ConnectionTerminated(reason.into())
    }
}

/// Errors produced by [`HubConnection`](crate::HubConnection).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HubError {
    /// A connection-level failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A framing or codec failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote completed the invocation with an error.
    #[error("{0}")]
    InvocationFailed(String),

    /// The connection closed before the invocation completed.
    #[error("{0}")]
    ConnectionClosed(String),
}

impl HubError {
    /// Create a connection-closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_messages_are_contract() {
        assert_eq!(
            ClientError::invalid_start_state().to_string(),
            "Cannot start a connection that is not in the Disconnected state."
        );
        assert_eq!(
            ClientError::invalid_send_state().to_string(),
            "Cannot send messages when the connection is not in the Connected state."
        );
    }

    #[test]
    fn test_terminated_preserves_message() {
        let err = ClientError::terminated("response status code does not indicate success: 500");
        assert_eq!(
            err.to_string(),
            "response status code does not indicate success: 500"
        );
    }

    #[test]
    fn test_pipe_error_message_passes_through() {
        let err: ClientError = PipeError::terminated("peer reset").into();
        assert_eq!(err.to_string(), "peer reset");
    }
}
