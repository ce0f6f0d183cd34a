//! The client connection state machine.
//!
//! A [`ClientConnection`] moves through
//! `Disconnected → Connecting → Connected → Disconnecting` and back, with
//! `Disposed` as the terminal state. The transitions are guarded by a single
//! state lock plus a latched completion for the in-flight start, so that:
//!
//! - only `Disconnected → Connecting` is accepted by `start`;
//! - `stop`/`dispose` issued while a start is in flight wait for that start
//!   to run to completion before tearing the transport down;
//! - concurrent stops observe one shared shutdown and the transport is only
//!   stopped once;
//! - a failed start reverts to `Disconnected` and reports the error to
//!   exactly the caller that initiated it.
//!
//! A supervisor task per start cycle awaits the transport's `running` signal
//! and the termination of the application reader. Whichever finishes first
//! drives the close: pending work is failed, the closed handlers fire exactly
//! once for the cycle, and, when enabled and the termination was not
//! user-initiated, a fresh pipe pair and transport are acquired and the
//! connection resumes at `Connecting`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, warn};

use hermes_pipe::{duplex_pair, DuplexPipe};
use hermes_transport::{Completion, Transport};

use crate::config::ClientConnectionConfig;
use crate::error::{ClientError, ClientResult};

/// Lifecycle state of a [`ClientConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport is attached. `start` is accepted.
    Disconnected,
    /// A start is in flight.
    Connecting,
    /// The transport is exchanging bytes.
    Connected,
    /// A teardown is in flight.
    Disconnecting,
    /// Terminal. No operation is accepted.
    Disposed,
}

/// Produces the transport used for each start or reconnect cycle.
pub trait TransportFactory: Send + Sync {
    /// Create (or hand out) the transport for the next cycle.
    fn create(&self) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Arc<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Transport> {
        self()
    }
}

type ReceivedHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;
type ClosedHandler = Arc<dyn Fn(Option<ClientError>) + Send + Sync>;

/// Everything owned by one successful start cycle.
#[derive(Clone)]
struct Cycle {
    transport: Arc<dyn Transport>,
    application: Arc<DuplexPipe>,
    /// Set before a user-initiated transport stop; suppresses reconnect.
    user_initiated: Arc<AtomicBool>,
    /// Resolved by the receive loop when the application reader terminates.
    receive_done: Completion,
    /// Resolved by the supervisor once teardown (including the state
    /// transition back to `Disconnected`) has finished.
    finished: Completion,
}

struct StateGuard {
    state: ConnectionState,
    /// Latched while a `start` is between its state transition and its
    /// outcome; `stop`/`dispose` wait on it.
    in_flight_start: Option<Completion>,
    cycle: Option<Cycle>,
    /// Once set, no reconnect cycle may begin.
    dispose_requested: bool,
}

struct Inner {
    config: ClientConnectionConfig,
    factory: Box<dyn TransportFactory>,
    state: tokio::sync::Mutex<StateGuard>,
    received: RwLock<Vec<ReceivedHandler>>,
    closed: RwLock<Vec<ClosedHandler>>,
}

/// A single logical connection bound to a pluggable transport.
#[derive(Clone)]
pub struct ClientConnection {
    inner: Arc<Inner>,
}

impl ClientConnection {
    /// Create a connection in the `Disconnected` state.
    pub fn new(config: ClientConnectionConfig, factory: impl TransportFactory + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                factory: Box::new(factory),
                state: tokio::sync::Mutex::new(StateGuard {
                    state: ConnectionState::Disconnected,
                    in_flight_start: None,
                    cycle: None,
                    dispose_requested: false,
                }),
                received: RwLock::new(Vec::new()),
                closed: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.state
    }

    /// Register a handler for inbound chunks.
    ///
    /// Handlers run sequentially, one chunk at a time; the application
    /// reader does not advance past a chunk until every handler's future has
    /// completed, so slow handlers exert backpressure on the transport.
    pub fn on_received<F, Fut>(&self, handler: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner
            .received
            .write()
            .push(Arc::new(move |chunk| handler(chunk).boxed()));
    }

    /// Register a handler invoked when a start cycle ends.
    ///
    /// Fires exactly once per completed start cycle, with the terminating
    /// error if the cycle did not end by user request. Never fires for a
    /// connection that was never started.
    pub fn on_closed<F>(&self, handler: F)
    where
        F: Fn(Option<ClientError>) + Send + Sync + 'static,
    {
        self.inner.closed.write().push(Arc::new(handler));
    }

    /// Start the connection.
    ///
    /// # Errors
    ///
    /// - [`ClientError::invalid_start_state`] when the connection is in any
    ///   state other than `Disconnected`.
    /// - The transport's start error, verbatim, when the transport fails; the
    ///   connection reverts to `Disconnected` and may be started again.
    pub async fn start(&self) -> ClientResult<()> {
        Inner::start(&self.inner).await
    }

    /// Stop the connection and wait for teardown.
    ///
    /// Waits for an in-flight `start` to complete first. Concurrent calls
    /// observe the same shutdown.
    pub async fn stop(&self) -> ClientResult<()> {
        Inner::shutdown(&self.inner, false).await
    }

    /// Stop the connection and transition to the terminal `Disposed` state.
    ///
    /// Disposing a connection that was never started is observably a no-op
    /// apart from the terminal transition.
    pub async fn dispose(&self) -> ClientResult<()> {
        Inner::shutdown(&self.inner, true).await
    }

    /// Send raw bytes to the remote endpoint.
    ///
    /// # Errors
    ///
    /// - [`ClientError::invalid_send_state`] when not `Connected`.
    /// - The transport's terminating error when the transport failed the
    ///   send; the connection closes as a consequence.
    pub async fn send(&self, data: &[u8]) -> ClientResult<()> {
        let application = {
            let guard = self.inner.state.lock().await;
            if guard.state != ConnectionState::Connected {
                return Err(ClientError::invalid_send_state());
            }
            match &guard.cycle {
                Some(cycle) => Arc::clone(&cycle.application),
                None => return Err(ClientError::invalid_send_state()),
            }
        };
        application.output.write(data).await?;
        Ok(())
    }

    /// Terminate the current cycle with a protocol-level error.
    ///
    /// Completes the application reader with the error, which the supervisor
    /// turns into a connection close.
    pub(crate) async fn terminate(&self, reason: &str) {
        let guard = self.inner.state.lock().await;
        if let Some(cycle) = &guard.cycle {
            cycle.application.input.complete_with_error(reason);
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection").finish_non_exhaustive()
    }
}

impl Inner {
    async fn start(inner: &Arc<Inner>) -> ClientResult<()> {
        let latch = {
            let mut guard = inner.state.lock().await;
            if guard.state != ConnectionState::Disconnected {
                return Err(ClientError::invalid_start_state());
            }
            guard.state = ConnectionState::Connecting;
            let latch = Completion::new();
            guard.in_flight_start = Some(latch.clone());
            latch
        };

        // The transport starts without the state lock held so that
        // stop/dispose can observe and wait on the in-flight latch.
        let result = Self::start_transport(inner).await;

        let outcome = {
            let mut guard = inner.state.lock().await;
            guard.in_flight_start = None;
            match result {
                Ok(cycle) => {
                    guard.state = ConnectionState::Connected;
                    guard.cycle = Some(cycle.clone());
                    Ok(cycle)
                }
                Err(error) => {
                    guard.state = ConnectionState::Disconnected;
                    Err(error)
                }
            }
        };
        latch.complete();

        match outcome {
            Ok(cycle) => {
                Self::spawn_cycle_tasks(inner, cycle);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn start_transport(inner: &Arc<Inner>) -> ClientResult<Cycle> {
        let transport = inner.factory.create();
        let (transport_pipe, application_pipe) = duplex_pair(
            inner.config.transport_pipe.clone(),
            inner.config.application_pipe.clone(),
        );

        transport
            .start(
                &inner.config.url,
                transport_pipe,
                inner.config.transfer_format,
            )
            .await?;

        Ok(Cycle {
            transport,
            application: Arc::new(application_pipe),
            user_initiated: Arc::new(AtomicBool::new(false)),
            receive_done: Completion::new(),
            finished: Completion::new(),
        })
    }

    fn spawn_cycle_tasks(inner: &Arc<Inner>, cycle: Cycle) {
        tokio::spawn(Self::receive_loop(Arc::clone(inner), cycle.clone()));
        tokio::spawn(Self::supervise(Arc::clone(inner), cycle));
    }

    /// Deliver inbound chunks to the registered handlers, in order, one
    /// chunk at a time.
    async fn receive_loop(inner: Arc<Inner>, cycle: Cycle) {
        loop {
            match cycle.application.input.readable().await {
                Ok(true) => {
                    let chunk = cycle.application.input.chunk();
                    let handlers = inner.received.read().clone();
                    for handler in handlers {
                        handler(chunk.clone()).await;
                    }
                    cycle.application.input.consume(chunk.len());
                }
                Ok(false) => {
                    cycle.receive_done.complete();
                    return;
                }
                Err(error) => {
                    cycle.receive_done.complete_with_error(error.to_string());
                    return;
                }
            }
        }
    }

    /// Watch the transport and the application reader, and drive the close
    /// when either terminates.
    async fn supervise(inner: Arc<Inner>, cycle: Cycle) {
        let mut error = tokio::select! {
            result = cycle.transport.running() => result.err().map(|e| e.to_string()),
            reason = cycle.receive_done.wait() => reason,
        };

        {
            let mut guard = inner.state.lock().await;
            if guard.state == ConnectionState::Connected {
                guard.state = ConnectionState::Disconnecting;
            }
        }

        let user_initiated = cycle.user_initiated.load(Ordering::SeqCst);
        if !user_initiated {
            if let Err(stop_error) = cycle.transport.stop().await {
                debug!(error = %stop_error, "transport stop during close reported an error");
            }
        }

        // Release anything still blocked on the pipes.
        cycle.application.output.complete();

        // The receive loop exits once the transport has completed the
        // application writer; pick up its error if we do not have one yet.
        if error.is_none() {
            error = cycle.receive_done.wait().await;
        }

        let closed_error = error.map(ClientError::terminated);
        debug!(?closed_error, user_initiated, "connection cycle ended");

        let handlers = inner.closed.read().clone();
        for handler in handlers {
            handler(closed_error.clone());
        }

        let reconnect = {
            let mut guard = inner.state.lock().await;
            guard.cycle = None;
            if guard.state == ConnectionState::Disconnecting {
                guard.state = ConnectionState::Disconnected;
            }
            inner.config.allow_reconnect
                && !user_initiated
                && !guard.dispose_requested
                && guard.state == ConnectionState::Disconnected
        };
        cycle.finished.complete();

        if reconnect {
            debug!("attempting automatic reconnect");
            match Self::start(&inner).await {
                Ok(()) => debug!("reconnect established"),
                Err(ClientError::InvalidState(_)) => {
                    debug!("reconnect abandoned: connection no longer disconnected");
                }
                Err(error) => warn!(%error, "reconnect attempt failed"),
            }
        }
    }

    async fn shutdown(inner: &Arc<Inner>, dispose: bool) -> ClientResult<()> {
        enum Action {
            Return,
            Wait(Completion),
            Stop(Cycle),
        }

        loop {
            let action = {
                let mut guard = inner.state.lock().await;
                if dispose {
                    guard.dispose_requested = true;
                }

                if let Some(latch) = guard.in_flight_start.clone() {
                    // Let the pending start run to completion; a half-started
                    // transport must never be torn down underneath it.
                    Action::Wait(latch)
                } else {
                    match guard.state {
                        ConnectionState::Disposed => Action::Return,
                        ConnectionState::Disconnected => {
                            if dispose {
                                guard.state = ConnectionState::Disposed;
                            }
                            Action::Return
                        }
                        ConnectionState::Connected => {
                            let cycle = match guard.cycle.clone() {
                                Some(cycle) => cycle,
                                None => {
                                    guard.state = ConnectionState::Disconnected;
                                    continue;
                                }
                            };
                            cycle.user_initiated.store(true, Ordering::SeqCst);
                            guard.state = ConnectionState::Disconnecting;
                            Action::Stop(cycle)
                        }
                        ConnectionState::Disconnecting => match &guard.cycle {
                            Some(cycle) => Action::Wait(cycle.finished.clone()),
                            None => {
                                guard.state = ConnectionState::Disconnected;
                                continue;
                            }
                        },
                        // `Connecting` always carries an in-flight latch.
                        ConnectionState::Connecting => {
                            debug!("connecting without an in-flight start latch");
                            continue;
                        }
                    }
                }
            };

            match action {
                Action::Return => return Ok(()),
                Action::Wait(completion) => {
                    completion.wait().await;
                }
                Action::Stop(cycle) => {
                    if let Err(error) = cycle.transport.stop().await {
                        debug!(%error, "transport stop reported an error");
                    }
                    cycle.application.output.complete();
                    cycle.finished.wait().await;
                }
            }
        }
    }
}
