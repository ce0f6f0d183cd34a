//! Bounded SPSC byte pipes and the duplex pair constructor.
//!
//! A pipe is a bounded byte queue with one producing half ([`PipeWriter`])
//! and one consuming half ([`PipeReader`]). Either half may complete the
//! pipe, optionally with a terminal error:
//!
//! - completion by the **writer** lets the reader drain buffered bytes before
//!   observing end-of-stream (or the error);
//! - completion by the **reader** discards buffered bytes and fails pending
//!   and subsequent writes immediately.
//!
//! [`PipeWriter::write`] resolves once the reader has consumed the written
//! bytes. This is what gives the connection core its backpressure and lets a
//! transport report a failed send to the caller that produced the bytes.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{PipeError, PipeResult};

/// Default per-pipe buffer capacity (64 KiB).
const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Options for a single pipe.
#[derive(Debug, Clone)]
pub struct PipeOptions {
    /// Maximum number of buffered bytes before writers wait for room.
    pub capacity: usize,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl PipeOptions {
    /// Create options with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer capacity in bytes.
    ///
    /// A capacity of zero is clamped to one so that writes can make progress.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

/// Terminal state of a pipe.
#[derive(Debug, Clone)]
struct Done {
    /// The terminating error message, if completion was not clean.
    error: Option<String>,
}

impl Done {
    fn to_error(&self) -> PipeError {
        match &self.error {
            Some(reason) => PipeError::Terminated(reason.clone()),
            None => PipeError::Closed,
        }
    }
}

#[derive(Debug)]
struct State {
    buffer: BytesMut,
    done: Option<Done>,
    /// Total bytes appended by the writer.
    written: u64,
    /// Total bytes consumed by the reader.
    consumed: u64,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    state: Mutex<State>,
    /// Signaled when bytes are appended or the pipe completes.
    readable: Notify,
    /// Signaled when bytes are consumed or the pipe completes.
    writable: Notify,
}

impl Shared {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            state: Mutex::new(State {
                buffer: BytesMut::new(),
                done: None,
                written: 0,
                consumed: 0,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        })
    }

    /// Latch the terminal state. The first completion wins.
    ///
    /// A completing reader discards its buffer (`drain = false`); a
    /// completing writer leaves it for the reader to drain.
    fn complete(&self, error: Option<String>, drain: bool) {
        let mut state = self.state.lock();
        if state.done.is_some() {
            return;
        }
        if !drain {
            state.buffer.clear();
        }
        state.done = Some(Done { error });
        drop(state);
        self.readable.notify_one();
        self.writable.notify_one();
    }
}

/// The producing half of a pipe.
///
/// Writes are serialized internally, so the writer can be shared behind an
/// `Arc` without additional locking.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
    /// Serializes concurrent producers so appended byte ranges never
    /// interleave and consumption acknowledgments match the right write.
    write_lock: tokio::sync::Mutex<()>,
}

impl PipeWriter {
    /// Append `bytes` to the pipe, waiting for buffer room as needed.
    ///
    /// Resolves once the reader has consumed the written bytes.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] if the pipe was completed cleanly.
    /// - [`PipeError::Terminated`] if either half completed the pipe with an
    ///   error, including while this write was in flight.
    pub async fn write(&self, bytes: &[u8]) -> PipeResult<()> {
        let _guard = self.write_lock.lock().await;

        if bytes.is_empty() {
            let state = self.shared.state.lock();
            return match &state.done {
                Some(done) => Err(done.to_error()),
                None => Ok(()),
            };
        }

        // Append with backpressure, possibly in several slices.
        let mut offset = 0;
        let target;
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(done) = &state.done {
                    return Err(done.to_error());
                }
                let room = self.shared.capacity.saturating_sub(state.buffer.len());
                if room > 0 {
                    let n = room.min(bytes.len() - offset);
                    state.buffer.extend_from_slice(&bytes[offset..offset + n]);
                    state.written += n as u64;
                    offset += n;
                    self.shared.readable.notify_one();
                    if offset == bytes.len() {
                        target = state.written;
                        break;
                    }
                }
            }
            self.shared.writable.notified().await;
        }

        // Wait for the reader to consume everything we appended.
        loop {
            {
                let state = self.shared.state.lock();
                if state.consumed >= target {
                    return Ok(());
                }
                if let Some(done) = &state.done {
                    return Err(done.to_error());
                }
            }
            self.shared.writable.notified().await;
        }
    }

    /// Complete the pipe cleanly. Idempotent.
    ///
    /// The reader drains any buffered bytes, then observes end-of-stream.
    pub fn complete(&self) {
        self.shared.complete(None, true);
    }

    /// Complete the pipe with a terminal error. Idempotent.
    ///
    /// The reader drains any buffered bytes, then observes the error.
    pub fn complete_with_error(&self, reason: impl Into<String>) {
        self.shared.complete(Some(reason.into()), true);
    }

    /// Whether the pipe has reached its terminal state.
    pub fn is_completed(&self) -> bool {
        self.shared.state.lock().done.is_some()
    }
}

/// The consuming half of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Wait until bytes are buffered or the pipe terminates.
    ///
    /// Returns `Ok(true)` when bytes are available, `Ok(false)` on clean
    /// end-of-stream with an empty buffer.
    ///
    /// # Errors
    ///
    /// [`PipeError::Terminated`] once the buffer is drained and the pipe was
    /// completed with an error.
    pub async fn readable(&self) -> PipeResult<bool> {
        loop {
            {
                let state = self.shared.state.lock();
                if !state.buffer.is_empty() {
                    return Ok(true);
                }
                if let Some(done) = &state.done {
                    return match &done.error {
                        Some(reason) => Err(PipeError::Terminated(reason.clone())),
                        None => Ok(false),
                    };
                }
            }
            self.shared.readable.notified().await;
        }
    }

    /// Snapshot the currently buffered bytes without consuming them.
    pub fn chunk(&self) -> Bytes {
        let state = self.shared.state.lock();
        Bytes::copy_from_slice(&state.buffer)
    }

    /// Advance the consumed cursor by up to `n` bytes, releasing writer
    /// capacity and acknowledging the corresponding writes.
    pub fn consume(&self, n: usize) {
        let mut state = self.shared.state.lock();
        let n = n.min(state.buffer.len());
        if n == 0 {
            return;
        }
        state.buffer.advance(n);
        state.consumed += n as u64;
        drop(state);
        self.shared.writable.notify_one();
    }

    /// Wait for bytes and consume everything currently buffered.
    ///
    /// Returns `Ok(None)` on clean end-of-stream.
    ///
    /// # Errors
    ///
    /// [`PipeError::Terminated`] once the buffer is drained and the pipe was
    /// completed with an error.
    pub async fn read(&self) -> PipeResult<Option<Bytes>> {
        loop {
            if !self.readable().await? {
                return Ok(None);
            }
            let mut state = self.shared.state.lock();
            if state.buffer.is_empty() {
                continue;
            }
            let bytes = state.buffer.split().freeze();
            state.consumed += bytes.len() as u64;
            drop(state);
            self.shared.writable.notify_one();
            return Ok(Some(bytes));
        }
    }

    /// Complete the pipe from the consuming side. Idempotent.
    ///
    /// Buffered bytes are discarded and pending or subsequent writes fail
    /// with [`PipeError::Closed`].
    pub fn complete(&self) {
        self.shared.complete(None, false);
    }

    /// Complete the pipe from the consuming side with a terminal error.
    /// Idempotent.
    ///
    /// Buffered bytes are discarded and pending or subsequent writes fail
    /// with [`PipeError::Terminated`] carrying `reason`. This is how a
    /// transport reports a failed send to the caller that produced the bytes.
    pub fn complete_with_error(&self, reason: impl Into<String>) {
        self.shared.complete(Some(reason.into()), false);
    }
}

fn pipe(options: &PipeOptions) -> (PipeWriter, PipeReader) {
    let shared = Shared::new(options.capacity);
    (
        PipeWriter {
            shared: Arc::clone(&shared),
            write_lock: tokio::sync::Mutex::new(()),
        },
        PipeReader { shared },
    )
}

/// One end of a duplex pair.
#[derive(Debug)]
pub struct DuplexPipe {
    /// Bytes produced by the other end.
    pub input: PipeReader,
    /// Bytes destined for the other end.
    pub output: PipeWriter,
}

/// Create a back-to-back pair of pipes.
///
/// Returns `(transport, application)` ends: bytes written on
/// `application.output` are read from `transport.input`, and bytes written on
/// `transport.output` are read from `application.input`. `transport_options`
/// sizes the application-to-transport pipe; `application_options` sizes the
/// transport-to-application pipe.
pub fn duplex_pair(
    transport_options: PipeOptions,
    application_options: PipeOptions,
) -> (DuplexPipe, DuplexPipe) {
    let (to_transport_writer, to_transport_reader) = pipe(&transport_options);
    let (to_application_writer, to_application_reader) = pipe(&application_options);

    let transport = DuplexPipe {
        input: to_transport_reader,
        output: to_application_writer,
    };
    let application = DuplexPipe {
        input: to_application_reader,
        output: to_transport_writer,
    };
    (transport, application)
}
