//! Transport contract for the Hermes framework.
//!
//! A transport moves framed bytes between client and server over a specific
//! wire protocol (WebSocket, HTTP long-polling, server-sent events). This
//! crate defines the boundary the connection core programs against: the
//! [`Transport`] trait, the [`TransferFormat`] negotiation types, and the
//! [`Completion`] latch transports use to report when their internal loops
//! have exited.
//!
//! Concrete wire implementations live outside this workspace; the connection
//! core and its tests only rely on the contract:
//!
//! - `start` returns once the transport is ready to exchange bytes, and
//!   rejects a multi-bit requested format;
//! - `stop` drains in-flight sends, shuts down, and completes the pipe
//!   output; afterwards `running` is complete;
//! - a failing transport reports the terminating error through the pipe and
//!   `running`, never out of band.

pub mod completion;
pub mod error;
pub mod format;
pub mod transport;

pub use completion::Completion;
pub use error::{TransportError, TransportResult};
pub use format::{TransferFormat, TransferFormats};
pub use transport::{validate_transfer_format, Transport};

/// Product token HTTP-based transports send as their `User-Agent`.
pub const USER_AGENT: &str = concat!("hermes/", env!("CARGO_PKG_VERSION"));
