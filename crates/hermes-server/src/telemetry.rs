//! Telemetry for the connection manager.
//!
//! The manager reports through an injected sink rather than a process-wide
//! source, so tests can observe or silence it per instance.

use std::time::Duration;

use tracing::debug;

use crate::id::ConnectionId;

/// Receives connection-manager lifecycle events.
pub trait TelemetrySink: Send + Sync {
    /// A connection was created and inserted into the registry.
    fn connection_created(&self, id: &ConnectionId) {
        let _ = id;
    }

    /// A connection was removed from the registry.
    fn connection_removed(&self, id: &ConnectionId) {
        let _ = id;
    }

    /// A scavenger pass finished.
    fn scan_completed(&self, elapsed: Duration, scanned: usize, disposed: usize) {
        let _ = (elapsed, scanned, disposed);
    }
}

/// The default sink: structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn connection_created(&self, id: &ConnectionId) {
        debug!(connection_id = %id, "connection created");
    }

    fn connection_removed(&self, id: &ConnectionId) {
        debug!(connection_id = %id, "connection removed");
    }

    fn scan_completed(&self, elapsed: Duration, scanned: usize, disposed: usize) {
        debug!(?elapsed, scanned, disposed, "scavenger pass finished");
    }
}

/// A sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {}
