//! # Hermes
//!
//! **Bidirectional RPC over pluggable transports**
//!
//! Hermes multiplexes remote procedure invocations and server-initiated
//! callbacks across a pluggable set of transports (WebSocket, HTTP
//! long-polling, server-sent events):
//!
//! - 🔌 **Pluggable transports** – one [`Transport`](transport::Transport)
//!   contract, any wire protocol
//! - 🔁 **Resilient connections** – supervised lifecycle with automatic
//!   reconnect on transport failure
//! - 📦 **Interchangeable codecs** – JSON and MessagePack hub protocols
//!   behind one trait
//! - 🧹 **Server-side scavenging** – idle connections reclaimed on a
//!   bounded, skip-when-busy timer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hermes::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = ClientConnection::new(
//!         ClientConnectionConfig::new("ws://localhost:5000/hub".parse()?),
//!         my_transport_factory,
//!     );
//!     let hub = HubConnection::new(connection, Arc::new(JsonHubProtocol::new()));
//!
//!     hub.start().await?;
//!     let reply = hub.invoke("Echo", vec!["hello".into()]).await?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HubConnection ──► HubProtocol (json / messagepack) ──► framed bytes
//!       │                                                     │
//!       ▼                                                     ▼
//! ClientConnection ──► DuplexPipe pair ◄──► Transport ◄──► network
//!
//! server: ConnectionManager ──► ServerConnection records ──► scavenger
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the duplex pipe primitives
pub use hermes_pipe as pipe;

// Re-export the transport contract
pub use hermes_transport as transport;

// Re-export the hub protocol codecs
pub use hermes_protocol as protocol;

// Re-export the client connection core and hub layer
pub use hermes_client as client;

// Re-export the server-side connection manager
pub use hermes_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_client::{
        ClientConnection, ClientConnectionConfig, ClientError, ConnectionState, HubConnection,
        HubError, TransportFactory,
    };

    pub use hermes_pipe::{duplex_pair, DuplexPipe, PipeOptions};

    pub use hermes_protocol::{
        HubMessage, HubProtocol, JsonHubProtocol, MessagePackHubProtocol, NegotiationMessage,
    };

    pub use hermes_server::{ConnectionManager, ConnectionManagerConfig, ServerConnection};

    pub use hermes_transport::{TransferFormat, TransferFormats, Transport};
}
