//! In-memory transport used by the integration suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use parking_lot::Mutex;
use tokio::sync::Notify;

use hermes_pipe::DuplexPipe;
use hermes_transport::{
    validate_transfer_format, Completion, TransferFormat, TransferFormats, Transport,
    TransportError, TransportResult,
};

/// Message a failing send reports, shaped like an HTTP client error.
pub const SEND_FAILURE: &str = "response status code does not indicate success: 500";

struct Active {
    pipe: Arc<DuplexPipe>,
    running: Completion,
}

/// A scriptable in-memory transport.
///
/// Bytes the application sends are recorded as frames; tests push inbound
/// bytes through [`push`](TestTransport::push). The instance is shared across
/// start cycles, so start-failure scripts and reconnects exercise the same
/// object.
pub struct TestTransport {
    /// When set, every `start` waits on this before proceeding.
    start_gate: Mutex<Option<Completion>>,
    /// Errors failing the next starts, consumed front to back.
    start_failures: Mutex<Vec<TransportError>>,
    /// Fail any outbound chunk containing `0x42` like an HTTP 500 on send.
    fail_sends: bool,
    current: Mutex<Option<Active>>,
    mode: Mutex<Option<TransferFormat>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    sent: Arc<Mutex<Vec<Bytes>>>,
    sent_notify: Arc<Notify>,
}

impl TestTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_gate: Mutex::new(None),
            start_failures: Mutex::new(Vec::new()),
            fail_sends: false,
            current: Mutex::new(None),
            mode: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            sent_notify: Arc::new(Notify::new()),
        })
    }

    /// Gate every `start` on `gate` resolving.
    pub fn gated(gate: Completion) -> Arc<Self> {
        let transport = Self::new();
        *transport.start_gate.lock() = Some(gate);
        transport
    }

    /// Fail the next starts with the given errors, in order.
    pub fn failing_starts(failures: Vec<TransportError>) -> Arc<Self> {
        let transport = Self::new();
        *transport.start_failures.lock() = failures;
        transport
    }

    /// Fail sends of chunks containing `0x42`.
    pub fn failing_sends() -> Arc<Self> {
        let mut transport = Self::new();
        Arc::get_mut(&mut transport).unwrap().fail_sends = true;
        transport
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Frames recorded from the application so far.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Wait until at least `count` frames have been recorded.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Bytes> {
        loop {
            let notified = self.sent_notify.notified();
            {
                let frames = self.sent.lock();
                if frames.len() >= count {
                    return frames.clone();
                }
            }
            notified.await;
        }
    }

    /// Deliver inbound bytes to the application.
    pub async fn push(&self, bytes: &[u8]) {
        let pipe = self
            .current
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.pipe))
            .expect("transport is not started");
        pipe.output.write(bytes).await.expect("inbound push failed");
    }

    /// Complete the inbound side cleanly, as a transport whose remote went
    /// away without an error would.
    pub fn complete_inbound(&self) {
        if let Some(active) = self.current.lock().as_ref() {
            active.pipe.output.complete();
            active.running.complete();
        }
    }

    /// Fail the inbound side, as a transport whose network died would.
    pub fn fail_inbound(&self, reason: &str) {
        if let Some(active) = self.current.lock().as_ref() {
            active.pipe.output.complete_with_error(reason);
            active.running.complete_with_error(reason);
        }
    }

    async fn pump(
        pipe: Arc<DuplexPipe>,
        running: Completion,
        sent: Arc<Mutex<Vec<Bytes>>>,
        sent_notify: Arc<Notify>,
        fail_sends: bool,
    ) {
        loop {
            match pipe.input.readable().await {
                Ok(true) => {
                    let chunk = pipe.input.chunk();
                    if fail_sends && chunk.contains(&0x42) {
                        // Leave the bytes unconsumed: the send is the failure.
                        pipe.input.complete_with_error(SEND_FAILURE);
                        pipe.output.complete_with_error(SEND_FAILURE);
                        running.complete_with_error(SEND_FAILURE);
                        return;
                    }
                    sent.lock().push(chunk.clone());
                    pipe.input.consume(chunk.len());
                    sent_notify.notify_one();
                }
                Ok(false) => {
                    pipe.output.complete();
                    running.complete();
                    return;
                }
                Err(error) => {
                    pipe.output.complete_with_error(error.to_string());
                    running.complete_with_error(error.to_string());
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TestTransport {
    async fn start(
        &self,
        _url: &Uri,
        pipe: DuplexPipe,
        requested: TransferFormats,
    ) -> TransportResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let format = validate_transfer_format(requested)?;

        let gate = self.start_gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }

        let scripted_failure = {
            let mut failures = self.start_failures.lock();
            if failures.is_empty() {
                None
            } else {
                Some(failures.remove(0))
            }
        };
        if let Some(failure) = scripted_failure {
            return Err(failure);
        }

        let pipe = Arc::new(pipe);
        let running = Completion::new();
        *self.current.lock() = Some(Active {
            pipe: Arc::clone(&pipe),
            running: running.clone(),
        });
        *self.mode.lock() = Some(format);

        tokio::spawn(Self::pump(
            pipe,
            running,
            Arc::clone(&self.sent),
            Arc::clone(&self.sent_notify),
            self.fail_sends,
        ));
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.current.lock().take() {
            active.pipe.output.complete();
            active.pipe.input.complete();
            active.running.complete();
        }
        Ok(())
    }

    async fn running(&self) -> TransportResult<()> {
        let completion = self
            .current
            .lock()
            .as_ref()
            .map(|active| active.running.clone())
            // Never started: block until a cycle exists.
            .unwrap_or_else(Completion::new);
        match completion.wait().await {
            None => Ok(()),
            Some(reason) => Err(TransportError::failed(reason)),
        }
    }

    fn mode(&self) -> Option<TransferFormat> {
        *self.mode.lock()
    }
}

/// A factory handing out the same shared transport each cycle.
pub fn shared_factory(transport: Arc<TestTransport>) -> impl Fn() -> Arc<dyn Transport> + Send + Sync {
    move || Arc::clone(&transport) as Arc<dyn Transport>
}
