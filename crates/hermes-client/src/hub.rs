//! The hub invocation layer.
//!
//! [`HubConnection`] speaks a negotiated hub protocol over a
//! [`ClientConnection`]: outbound calls are encoded as invocations with
//! monotonically increasing ids, matched back to their completions; inbound
//! invocations are routed to handlers registered by target name
//! (case-sensitively); stream items are pushed to their stream's observer.
//!
//! When the underlying connection closes, every pending invocation and open
//! stream is failed with the close error.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use hermes_protocol::{HubMessage, HubProtocol, InvocationBinder, NegotiationMessage, NullBinder};

use crate::connection::ClientConnection;
use crate::error::{ClientError, HubError, HubResult};

type MethodHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The consumer half of a streaming invocation.
pub struct StreamHandle {
    invocation_id: String,
    items: mpsc::UnboundedReceiver<Value>,
}

impl StreamHandle {
    /// The invocation id this stream belongs to.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Receive the next stream item.
    ///
    /// Returns `None` once the stream's completion has arrived or the
    /// connection has closed.
    pub async fn next(&mut self) -> Option<Value> {
        self.items.recv().await
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("invocation_id", &self.invocation_id)
            .finish()
    }
}

struct HubInner {
    connection: ClientConnection,
    protocol: Arc<dyn HubProtocol>,
    binder: Arc<dyn InvocationBinder>,
    next_id: AtomicU64,
    pending: DashMap<String, oneshot::Sender<HubResult<Option<Value>>>>,
    streams: DashMap<String, mpsc::UnboundedSender<Value>>,
    handlers: DashMap<String, MethodHandler>,
    parse_buffer: Mutex<BytesMut>,
}

/// An RPC endpoint layered over a [`ClientConnection`].
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<HubInner>,
}

impl HubConnection {
    /// Create a hub connection speaking `protocol`, accepting any inbound
    /// payload shapes.
    pub fn new(connection: ClientConnection, protocol: Arc<dyn HubProtocol>) -> Self {
        Self::with_binder(connection, protocol, Arc::new(NullBinder))
    }

    /// Create a hub connection with an explicit invocation binder.
    pub fn with_binder(
        connection: ClientConnection,
        protocol: Arc<dyn HubProtocol>,
        binder: Arc<dyn InvocationBinder>,
    ) -> Self {
        let inner = Arc::new(HubInner {
            connection,
            protocol,
            binder,
            next_id: AtomicU64::new(0),
            pending: DashMap::new(),
            streams: DashMap::new(),
            handlers: DashMap::new(),
            parse_buffer: Mutex::new(BytesMut::new()),
        });

        let receiver = Arc::clone(&inner);
        inner.connection.on_received(move |chunk: Bytes| {
            let receiver = Arc::clone(&receiver);
            async move { receiver.process_incoming(&chunk).await }.boxed()
        });

        let closer = Arc::clone(&inner);
        inner
            .connection
            .on_closed(move |error| closer.fail_outstanding(error));

        Self { inner }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &ClientConnection {
        &self.inner.connection
    }

    /// Start the connection and send the protocol negotiation record.
    pub async fn start(&self) -> HubResult<()> {
        self.inner.connection.start().await?;

        let mut out = BytesMut::new();
        hermes_protocol::negotiate::write_negotiation(
            &NegotiationMessage::new(self.inner.protocol.name()),
            &mut out,
        );
        self.inner.connection.send(&out).await?;
        Ok(())
    }

    /// Stop the underlying connection.
    pub async fn stop(&self) -> HubResult<()> {
        self.inner.connection.stop().await?;
        Ok(())
    }

    /// Dispose the underlying connection.
    pub async fn dispose(&self) -> HubResult<()> {
        self.inner.connection.dispose().await?;
        Ok(())
    }

    /// Register a handler for server-initiated invocations of `target`.
    ///
    /// Targets are matched case-sensitively.
    pub fn on<F, Fut>(&self, target: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.insert(
            target.into(),
            Arc::new(move |arguments| handler(arguments).boxed()),
        );
    }

    /// Invoke `target` on the remote endpoint and await its completion.
    ///
    /// # Errors
    ///
    /// - [`HubError::InvocationFailed`] when the remote completion carries an
    ///   error;
    /// - [`HubError::ConnectionClosed`] when the connection closes before
    ///   the completion arrives;
    /// - connection-state and encoding failures, verbatim.
    pub async fn invoke(
        &self,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> HubResult<Option<Value>> {
        let id = self.inner.allocate_id();
        let message = HubMessage::invocation(id.clone(), target, arguments);

        let (sender, receiver) = oneshot::channel();
        self.inner.pending.insert(id.clone(), sender);

        if let Err(send_error) = self.inner.write(&message).await {
            self.inner.pending.remove(&id);
            return Err(send_error);
        }

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(HubError::connection_closed(
                "the connection closed before the invocation completed",
            )),
        }
    }

    /// Invoke `target` without expecting a completion.
    pub async fn send(&self, target: impl Into<String>, arguments: Vec<Value>) -> HubResult<()> {
        let message = HubMessage::non_blocking_invocation(target, arguments);
        self.inner.write(&message).await
    }

    /// Invoke `target` as a streaming call.
    ///
    /// Items arrive on the returned handle until the invocation's completion
    /// closes the stream.
    pub async fn invoke_stream(
        &self,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> HubResult<StreamHandle> {
        let id = self.inner.allocate_id();
        let message = HubMessage::invocation(id.clone(), target, arguments);

        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.streams.insert(id.clone(), sender);

        if let Err(send_error) = self.inner.write(&message).await {
            self.inner.streams.remove(&id);
            return Err(send_error);
        }

        Ok(StreamHandle {
            invocation_id: id,
            items: receiver,
        })
    }
}

impl fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConnection")
            .field("protocol", &self.inner.protocol.name())
            .finish_non_exhaustive()
    }
}

impl HubInner {
    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    async fn write(&self, message: &HubMessage) -> HubResult<()> {
        let mut out = BytesMut::new();
        self.protocol.write_message(message, &mut out)?;
        self.connection.send(&out).await?;
        Ok(())
    }

    async fn process_incoming(self: &Arc<Self>, chunk: &[u8]) {
        let mut messages = Vec::new();
        let parse_result = {
            let mut buffer = self.parse_buffer.lock();
            buffer.extend_from_slice(chunk);
            self.protocol
                .try_parse_messages(&mut buffer, self.binder.as_ref(), &mut messages)
        };

        if let Err(parse_error) = parse_result {
            error!(%parse_error, "malformed hub message; closing the connection");
            self.connection.terminate(&parse_error.to_string()).await;
            return;
        }

        for message in messages {
            self.dispatch(message).await;
        }
    }

    async fn dispatch(&self, message: HubMessage) {
        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                ..
            } => {
                let handler = self.handlers.get(&target).map(|h| Arc::clone(h.value()));
                match handler {
                    Some(handler) => handler(arguments).await,
                    None => {
                        warn!(target = %target, "no handler registered for invocation target")
                    }
                }
                if let Some(id) = invocation_id {
                    debug!(invocation_id = %id, "inbound blocking invocation handled");
                }
            }
            HubMessage::StreamItem {
                invocation_id,
                item,
            } => match self.streams.get(&invocation_id) {
                Some(stream) => {
                    let _ = stream.send(item);
                }
                None => warn!(invocation_id = %invocation_id, "stream item for unknown stream"),
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                if let Some((_, sender)) = self.pending.remove(&invocation_id) {
                    let outcome = match error {
                        Some(error) => Err(HubError::InvocationFailed(error)),
                        None => Ok(result),
                    };
                    let _ = sender.send(outcome);
                } else if let Some((_, stream)) = self.streams.remove(&invocation_id) {
                    if let Some(error) = error {
                        warn!(invocation_id = %invocation_id, %error, "stream completed with error");
                    }
                    // Dropping the sender ends the stream.
                    drop(stream);
                } else {
                    warn!(invocation_id = %invocation_id, "completion for unknown invocation");
                }
            }
        }
    }

    /// Fail every pending invocation and open stream with the close error.
    fn fail_outstanding(&self, close_error: Option<ClientError>) {
        let reason = close_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "the connection was closed".to_owned());

        let pending: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in pending {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(Err(HubError::connection_closed(reason.clone())));
            }
        }

        self.streams.clear();
        self.parse_buffer.lock().clear();
    }
}
