//! A latched, one-shot completion cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// A one-shot completion any number of tasks can await.
///
/// The first call to [`complete`](Completion::complete) or
/// [`complete_with_error`](Completion::complete_with_error) wins; later
/// calls are ignored. Waiters that arrive after completion resolve
/// immediately. Clones share the same cell.
///
/// Transports use this to back their `running` signal; the connection core
/// uses it to latch in-flight starts and closed cycles.
#[derive(Debug, Clone)]
pub struct Completion {
    triggered: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
    sender: broadcast::Sender<()>,
}

impl Completion {
    /// Create a new, unresolved completion.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
            sender,
        }
    }

    /// Resolve the completion successfully.
    ///
    /// Returns `true` if this call resolved it, `false` if it was already
    /// resolved.
    pub fn complete(&self) -> bool {
        self.finish(None)
    }

    /// Resolve the completion with an error message.
    ///
    /// Returns `true` if this call resolved it, `false` if it was already
    /// resolved.
    pub fn complete_with_error(&self, reason: impl Into<String>) -> bool {
        self.finish(Some(reason.into()))
    }

    fn finish(&self, error: Option<String>) -> bool {
        {
            let mut slot = self.error.lock();
            if self.triggered.load(Ordering::SeqCst) {
                return false;
            }
            *slot = error;
            self.triggered.store(true, Ordering::SeqCst);
        }
        // Ignore error if no receivers.
        let _ = self.sender.send(());
        true
    }

    /// Whether the completion has resolved.
    pub fn is_complete(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// The error the completion resolved with, if any.
    pub fn error(&self) -> Option<String> {
        if self.is_complete() {
            self.error.lock().clone()
        } else {
            None
        }
    }

    /// Wait for the completion to resolve.
    ///
    /// Returns the error message it resolved with, or `None` on success.
    pub async fn wait(&self) -> Option<String> {
        // Subscribe before the fast-path check so a resolution landing in
        // between still reaches the receiver.
        let mut receiver = self.sender.subscribe();
        if !self.triggered.load(Ordering::SeqCst) {
            let _ = receiver.recv().await;
        }
        self.error.lock().clone()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
