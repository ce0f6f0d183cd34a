//! The connection registry and scavenger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionManagerConfig;
use crate::error::{ServerError, ServerResult};
use crate::id::ConnectionId;
use crate::record::{ConnectionStatus, ServerConnection};
use crate::telemetry::{TelemetrySink, TracingTelemetry};

type Registry = Arc<DashMap<ConnectionId, Arc<ServerConnection>>>;

/// Owns every live logical connection on the server.
///
/// # Example
///
/// ```
/// use hermes_server::{ConnectionManager, ConnectionManagerConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let manager = ConnectionManager::new(ConnectionManagerConfig::default());
///
/// let connection = manager.create_connection().unwrap();
/// assert!(manager.try_get_connection(&connection.id()).is_some());
///
/// manager.close_connections().await;
/// assert!(manager.is_empty());
/// # }
/// ```
pub struct ConnectionManager {
    config: ConnectionManagerConfig,
    connections: Registry,
    telemetry: Arc<dyn TelemetrySink>,
    /// Serializes `start`, `close_connections`, and the scavenger pass.
    execution_lock: Arc<AsyncMutex<()>>,
    closed: AtomicBool,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager reporting through the default tracing telemetry.
    pub fn new(config: ConnectionManagerConfig) -> Arc<Self> {
        Self::with_telemetry(config, Arc::new(TracingTelemetry))
    }

    /// Create a manager with an explicit telemetry sink.
    pub fn with_telemetry(
        config: ConnectionManagerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connections: Arc::new(DashMap::new()),
            telemetry,
            execution_lock: Arc::new(AsyncMutex::new(())),
            closed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        })
    }

    /// The manager's configuration.
    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.config
    }

    /// The number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether the scavenger timer is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The ids of every live connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Mint a new connection: a fresh id, a fresh duplex pair, a record
    /// inserted into the registry.
    ///
    /// # Errors
    ///
    /// [`ServerError::ManagerClosed`] once
    /// [`close_connections`](ConnectionManager::close_connections) has run.
    pub fn create_connection(&self) -> ServerResult<Arc<ServerConnection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServerError::ManagerClosed);
        }

        let record = Arc::new(ServerConnection::new(
            ConnectionId::new(),
            self.config.transport_pipe.clone(),
            self.config.application_pipe.clone(),
        ));
        self.connections.insert(record.id(), Arc::clone(&record));
        self.telemetry.connection_created(&record.id());

        debug!(
            connection_id = %record.id(),
            total = self.connections.len(),
            "connection accepted"
        );
        Ok(record)
    }

    /// Look up a connection by id.
    pub fn try_get_connection(&self, id: &ConnectionId) -> Option<Arc<ServerConnection>> {
        self.connections.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Atomically take a connection out of the registry.
    pub fn remove_connection(&self, id: &ConnectionId) -> Option<Arc<ServerConnection>> {
        remove_from(&self.connections, &self.telemetry, id)
    }

    /// Start the scavenger timer. Idempotent.
    pub fn start(&self) {
        if self.closed.load(Ordering::SeqCst) || self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let connections = Arc::clone(&self.connections);
        let telemetry = Arc::clone(&self.telemetry);
        let execution_lock = Arc::clone(&self.execution_lock);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let first_tick = tokio::time::Instant::now() + config.scan_interval;
            let mut interval = tokio::time::interval_at(first_tick, config.scan_interval);
            // The pass runs inline, so a long pass delays the next tick
            // instead of piling ticks behind it.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scan_pass(&connections, &telemetry, &execution_lock, &config).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("scavenger received shutdown signal");
                        break;
                    }
                }
            }
        });

        *self.loop_handle.lock() = Some(handle);
        info!("connection scavenger started");
    }

    /// Run one scavenger pass.
    ///
    /// Returns `false` when the pass was skipped because the execution lock
    /// was held — by `close_connections` or by another pass — which bounds
    /// the scavenger to one pass in flight.
    pub async fn scan(&self) -> bool {
        scan_pass(
            &self.connections,
            &self.telemetry,
            &self.execution_lock,
            &self.config,
        )
        .await
    }

    /// Dispose a connection and take it out of the registry.
    ///
    /// Dispose failures never propagate: teardown-time resets are logged at
    /// debug severity, anything else as an error. Removal always happens.
    pub async fn dispose_and_remove(&self, record: Arc<ServerConnection>) {
        dispose_and_remove_record(&self.connections, &self.telemetry, record).await;
    }

    /// Close the manager: stop the scavenger, dispose every connection
    /// concurrently, and reject further `create_connection` calls.
    ///
    /// Waits at most the configured shutdown timeout in total; disposals
    /// still in flight after that proceed detached.
    pub async fn close_connections(&self) {
        {
            let _guard = self.execution_lock.lock().await;
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.running.store(false, Ordering::Release);
            if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
                let _ = shutdown_tx.try_send(());
            }
        }

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let records: Vec<Arc<ServerConnection>> = self
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        info!(connections = records.len(), "closing all connections");

        let disposals: Vec<_> = records
            .into_iter()
            .map(|record| {
                let connections = Arc::clone(&self.connections);
                let telemetry = Arc::clone(&self.telemetry);
                tokio::spawn(async move {
                    dispose_and_remove_record(&connections, &telemetry, record).await;
                })
            })
            .collect();

        if tokio::time::timeout(self.config.shutdown_timeout, join_all(disposals))
            .await
            .is_err()
        {
            warn!("shutdown timeout elapsed; abandoning remaining disposals");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn remove_from(
    connections: &Registry,
    telemetry: &Arc<dyn TelemetrySink>,
    id: &ConnectionId,
) -> Option<Arc<ServerConnection>> {
    let removed = connections.remove(id).map(|(_, record)| record);
    if removed.is_some() {
        telemetry.connection_removed(id);
        debug!(connection_id = %id, "connection removed");
    }
    removed
}

async fn dispose_and_remove_record(
    connections: &Registry,
    telemetry: &Arc<dyn TelemetrySink>,
    record: Arc<ServerConnection>,
) {
    match record.dispose().await {
        Ok(()) => {}
        Err(failure) if failure.is_reset() => {
            debug!(connection_id = %record.id(), error = %failure, "connection reset during dispose");
        }
        Err(failure) => {
            error!(connection_id = %record.id(), error = %failure, "failed disposing connection");
        }
    }
    remove_from(connections, telemetry, &record.id());
}

async fn scan_pass(
    connections: &Registry,
    telemetry: &Arc<dyn TelemetrySink>,
    execution_lock: &Arc<AsyncMutex<()>>,
    config: &ConnectionManagerConfig,
) -> bool {
    let Ok(_guard) = execution_lock.try_lock() else {
        debug!("scavenger pass skipped: execution lock is held");
        return false;
    };

    let started_at = Instant::now();
    let records: Vec<Arc<ServerConnection>> =
        connections.iter().map(|e| Arc::clone(e.value())).collect();
    let scanned = records.len();
    let mut disposed = 0;

    for record in records {
        let activity = record.snapshot().await;
        let stale = activity.status == ConnectionStatus::Inactive
            && activity.last_seen.elapsed() > config.disconnect_timeout;

        if stale && !config.disposal_suppressed {
            disposed += 1;
            debug!(connection_id = %record.id(), "scavenging idle connection");
            let connections = Arc::clone(connections);
            let telemetry = Arc::clone(telemetry);
            tokio::spawn(async move {
                dispose_and_remove_record(&connections, &telemetry, record).await;
            });
        } else {
            record.tick_heartbeat();
        }
    }

    telemetry.scan_completed(started_at.elapsed(), scanned, disposed);
    true
}
