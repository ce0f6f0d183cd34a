//! Server-side connection registry for the Hermes framework.
//!
//! The [`ConnectionManager`] owns every live logical connection: it mints
//! opaque connection ids, allocates the duplex pipe pair each
//! [`ServerConnection`] record wraps, scans for idle connections on a timer,
//! and shuts everything down atomically at process stop.
//!
//! The scavenger runs at a fixed cadence with a skip-when-busy policy: a
//! tick that finds the manager's execution lock held gives up immediately,
//! so at most one pass is ever in flight and scan overhead is bounded by the
//! length of a single pass.

pub mod config;
pub mod error;
pub mod id;
pub mod manager;
pub mod record;
pub mod telemetry;

pub use config::ConnectionManagerConfig;
pub use error::{ServerError, ServerResult};
pub use id::ConnectionId;
pub use manager::ConnectionManager;
pub use record::{ConnectionActivity, ConnectionStatus, ServerConnection};
pub use telemetry::{NoopTelemetry, TelemetrySink, TracingTelemetry};
