//! Error types for protocol parsing and encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or parsing framed messages.
///
/// Parsers raise these synchronously for malformed input; "not enough data"
/// is never an error, it is an `Ok(None)`/no-progress return that leaves the
/// buffer intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A negotiation record was structurally invalid.
    #[error("invalid negotiation message: {0}")]
    InvalidNegotiation(String),

    /// A hub message record was structurally invalid.
    #[error("invalid hub message: {0}")]
    InvalidMessage(String),

    /// A record could not be decoded as its wire format.
    #[error("failed to decode message: {0}")]
    DecodeFailed(String),

    /// A message could not be encoded.
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),

    /// A binary length prefix exceeded five bytes or ~2 GiB.
    #[error("messages over 2GB in size are not supported")]
    MessageTooLarge,
}

impl ProtocolError {
    /// Create an invalid-negotiation error.
    pub fn invalid_negotiation(reason: impl Into<String>) -> Self {
        Self::InvalidNegotiation(reason.into())
    }

    /// Create an invalid-message error.
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage(reason.into())
    }

    /// Create a decode-failed error.
    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::DecodeFailed(reason.into())
    }

    /// Create an encode-failed error.
    pub fn encode_failed(reason: impl Into<String>) -> Self {
        Self::EncodeFailed(reason.into())
    }
}
