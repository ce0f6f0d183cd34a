//! The per-connection server record.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::debug;

use hermes_pipe::{duplex_pair, DuplexPipe, PipeOptions};

use crate::error::{ServerError, ServerResult};
use crate::id::ConnectionId;

/// Whether a connection currently has a transport attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A transport is servicing the connection.
    Active,
    /// No transport is attached; the scavenger may reclaim the connection
    /// once it has idled past the disconnect timeout.
    Inactive,
}

/// The mutable activity state guarded by the per-connection mutex.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionActivity {
    /// Whether a transport is attached.
    pub status: ConnectionStatus,
    /// When the connection was last seen by a transport.
    pub last_seen: Instant,
}

type HeartbeatHandler = Box<dyn Fn() + Send + Sync>;
type DisposeHandler = Box<dyn Fn() -> ServerResult<()> + Send + Sync>;

/// One live logical connection owned by the
/// [`ConnectionManager`](crate::ConnectionManager).
///
/// The record owns the duplex pair: the transport host drives the
/// [`transport`](ServerConnection::transport) end while application code
/// reads and writes the [`application`](ServerConnection::application) end.
/// Activity state is mutated under the per-connection mutex exposed by
/// [`activity`](ServerConnection::activity).
pub struct ServerConnection {
    id: ConnectionId,
    transport: Arc<DuplexPipe>,
    application: Arc<DuplexPipe>,
    activity: AsyncMutex<ConnectionActivity>,
    heartbeat_handlers: Mutex<Vec<HeartbeatHandler>>,
    dispose_handlers: Mutex<Vec<DisposeHandler>>,
    features: DashMap<String, Arc<dyn Any + Send + Sync>>,
    disposed: AtomicBool,
}

impl ServerConnection {
    /// Create a record with a freshly allocated duplex pair.
    pub fn new(
        id: ConnectionId,
        transport_pipe: PipeOptions,
        application_pipe: PipeOptions,
    ) -> Self {
        let (transport, application) = duplex_pair(transport_pipe, application_pipe);
        Self {
            id,
            transport: Arc::new(transport),
            application: Arc::new(application),
            activity: AsyncMutex::new(ConnectionActivity {
                status: ConnectionStatus::Inactive,
                last_seen: Instant::now(),
            }),
            heartbeat_handlers: Mutex::new(Vec::new()),
            dispose_handlers: Mutex::new(Vec::new()),
            features: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// The connection's opaque identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The transport end of the duplex pair.
    pub fn transport(&self) -> Arc<DuplexPipe> {
        Arc::clone(&self.transport)
    }

    /// The application end of the duplex pair.
    pub fn application(&self) -> Arc<DuplexPipe> {
        Arc::clone(&self.application)
    }

    /// Acquire the per-connection mutex over the activity state.
    ///
    /// Transports update status and last-seen under this guard; the
    /// scavenger takes it briefly to snapshot.
    pub async fn activity(&self) -> MutexGuard<'_, ConnectionActivity> {
        self.activity.lock().await
    }

    /// Snapshot the activity state.
    pub async fn snapshot(&self) -> ConnectionActivity {
        *self.activity.lock().await
    }

    /// Mark the connection active and refresh its last-seen time.
    pub async fn mark_active(&self) {
        let mut activity = self.activity.lock().await;
        activity.status = ConnectionStatus::Active;
        activity.last_seen = Instant::now();
    }

    /// Mark the connection inactive and refresh its last-seen time.
    pub async fn mark_inactive(&self) {
        let mut activity = self.activity.lock().await;
        activity.status = ConnectionStatus::Inactive;
        activity.last_seen = Instant::now();
    }

    /// Overwrite the activity state. Primarily useful to transports
    /// restoring a connection and to tests backdating idle time.
    pub async fn set_activity(&self, status: ConnectionStatus, last_seen: Instant) {
        let mut activity = self.activity.lock().await;
        activity.status = status;
        activity.last_seen = last_seen;
    }

    /// Register a callback run on every scavenger heartbeat.
    pub fn on_heartbeat(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.heartbeat_handlers.lock().push(Box::new(handler));
    }

    /// Run the registered heartbeat callbacks.
    pub fn tick_heartbeat(&self) {
        for handler in self.heartbeat_handlers.lock().iter() {
            handler();
        }
    }

    /// Register a callback run during disposal, before the pipes complete.
    ///
    /// Transport hosts hook their teardown here; a returned error is
    /// reported by [`ServerConnection::dispose`] but never blocks disposal.
    pub fn on_dispose(&self, handler: impl Fn() -> ServerResult<()> + Send + Sync + 'static) {
        self.dispose_handlers.lock().push(Box::new(handler));
    }

    /// Attach an arbitrary feature to the connection.
    pub fn set_feature<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        self.features.insert(key.into(), value);
    }

    /// Look up a feature by key and type.
    pub fn feature<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.features
            .get(key)
            .and_then(|entry| Arc::clone(entry.value()).downcast::<T>().ok())
    }

    /// Whether the connection has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Dispose the connection. Idempotent.
    ///
    /// Runs the registered dispose callbacks and completes every pipe half
    /// so blocked readers and writers unwind. The pipes complete even when a
    /// callback fails; the first callback error is returned.
    pub async fn dispose(&self) -> ServerResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(connection_id = %self.id, "disposing connection");

        let mut first_error: Option<ServerError> = None;
        for handler in self.dispose_handlers.lock().iter() {
            if let Err(error) = handler() {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        self.transport.output.complete();
        self.transport.input.complete();
        self.application.output.complete();
        self.application.input.complete();

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
