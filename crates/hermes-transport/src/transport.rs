//! The transport contract.

use async_trait::async_trait;
use http::Uri;

use hermes_pipe::DuplexPipe;

use crate::error::{TransportError, TransportResult};
use crate::format::{TransferFormat, TransferFormats};

/// A bidirectional byte transport over a specific wire protocol.
///
/// Implementations take the transport end of a duplex pair in `start` and
/// shuttle bytes between it and the network: bytes read from `pipe.input`
/// go out on the wire, bytes arriving from the wire are written to
/// `pipe.output`.
///
/// # Contract
///
/// - [`start`](Transport::start) returns only after the transport is ready
///   to exchange bytes; failures propagate through the returned result.
/// - [`stop`](Transport::stop) drains in-flight sends, shuts down network
///   handles, and completes `pipe.output`. After `stop` returns,
///   [`running`](Transport::running) must be complete.
/// - If the remote or the network fails, the transport completes the
///   application writer with the terminating error and lets `running`
///   resolve; it never reports failure out of band.
/// - A multi-bit requested format fails `start` with
///   [`TransportError::InvalidTransferMode`]
///   (use [`validate_transfer_format`]).
///
/// Methods take `&self` so a transport instance can be shared behind an
/// `Arc` and restarted across reconnect cycles; implementations keep their
/// mutable state behind interior mutability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport against `url`, exchanging bytes over `pipe`.
    ///
    /// Implementations may append transport-specific suffixes to `url`
    /// before connecting.
    async fn start(
        &self,
        url: &Uri,
        pipe: DuplexPipe,
        requested: TransferFormats,
    ) -> TransportResult<()>;

    /// Gracefully stop the transport.
    async fn stop(&self) -> TransportResult<()>;

    /// Wait for the transport's internal loops to exit.
    ///
    /// Resolves with the terminating error if the transport failed. May be
    /// awaited by any number of tasks.
    async fn running(&self) -> TransportResult<()>;

    /// The negotiated transfer format, `None` until `start` has returned.
    fn mode(&self) -> Option<TransferFormat>;
}

/// Validate a requested transfer format for `start`.
///
/// # Errors
///
/// [`TransportError::InvalidTransferMode`] unless exactly one bit is set.
pub fn validate_transfer_format(requested: TransferFormats) -> TransportResult<TransferFormat> {
    requested
        .single()
        .ok_or(TransportError::InvalidTransferMode)
}
