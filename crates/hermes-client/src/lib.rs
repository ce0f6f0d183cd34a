//! Client connection core and hub invocation layer for the Hermes framework.
//!
//! [`ClientConnection`] binds one logical connection to a [`Transport`]
//! implementation: it owns the duplex pipe pair, runs the
//! `Disconnected → Connecting → Connected → Disconnecting` state machine,
//! serializes start/stop/dispose races, supervises the transport, fans
//! inbound chunks out to registered handlers, and reconnects after
//! non-user-initiated failures when configured to.
//!
//! [`HubConnection`] layers RPC on top: it speaks a negotiated
//! [`HubProtocol`](hermes_protocol::HubProtocol), matches completions to
//! pending invocations, and routes server-initiated invocations to
//! registered handlers.
//!
//! [`Transport`]: hermes_transport::Transport

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;

pub use config::ClientConnectionConfig;
pub use connection::{ClientConnection, ConnectionState, TransportFactory};
pub use error::{ClientError, ClientResult, HubError, HubResult};
pub use hub::{HubConnection, StreamHandle};
