//! Single-flight FIFO queue for sync work.
//!
//! Every submission is chained behind the previous one: it waits for the
//! prior tail to finish (whatever the outcome), runs its own body, then
//! releases the next submission. Bodies run on spawned Tokio tasks, so a
//! caller that stops awaiting does not pull its operation out of the chain.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::error::{SyncError, SyncResult};
use crate::flags::SyncFlags;

/// Default capacity of the activity broadcast channel.
pub const DEFAULT_ACTIVITY_BUFFER: usize = 64;

/// Progress snapshot published on every operation start and finish.
///
/// `pending_count == 0` exactly when `current_label` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueActivity {
    pub pending_count: usize,
    pub current_label: Option<String>,
}

impl QueueActivity {
    pub fn is_idle(&self) -> bool {
        self.pending_count == 0
    }
}

struct QueueInner {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
    activity: Mutex<QueueActivity>,
    activity_tx: broadcast::Sender<QueueActivity>,
    flags: Arc<SyncFlags>,
}

impl QueueInner {
    fn begin(&self, label: &str) {
        let mut activity = self.activity.lock();
        activity.pending_count += 1;
        activity.current_label = Some(label.to_string());
        // No subscribers is fine
        let _ = self.activity_tx.send(activity.clone());
    }

    fn finish(&self) {
        let mut activity = self.activity.lock();
        activity.pending_count = activity.pending_count.saturating_sub(1);
        if activity.pending_count == 0 {
            activity.current_label = None;
        }
        let _ = self.activity_tx.send(activity.clone());
    }
}

/// Marks the running operation finished and releases the next one, also
/// when the body panics.
struct RunningGuard {
    inner: Arc<QueueInner>,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.finish();
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Serial operation queue. Cloning yields another handle to the same chain.
#[derive(Clone)]
pub struct SerialOperationQueue {
    inner: Arc<QueueInner>,
}

impl SerialOperationQueue {
    pub fn new(flags: Arc<SyncFlags>) -> Self {
        Self::with_activity_buffer(flags, DEFAULT_ACTIVITY_BUFFER)
    }

    pub fn with_activity_buffer(flags: Arc<SyncFlags>, buffer: usize) -> Self {
        let (activity_tx, _) = broadcast::channel(buffer.max(1));
        Self {
            inner: Arc::new(QueueInner {
                tail: Mutex::new(None),
                activity: Mutex::new(QueueActivity::default()),
                activity_tx,
                flags,
            }),
        }
    }

    /// Current progress snapshot.
    pub fn activity(&self) -> QueueActivity {
        self.inner.activity.lock().clone()
    }

    /// Subscribe to progress events. Events published before the call are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueActivity> {
        self.inner.activity_tx.subscribe()
    }

    pub fn flags(&self) -> &Arc<SyncFlags> {
        &self.inner.flags
    }

    /// Submit `operation` for serial execution.
    ///
    /// The position in the queue is taken when this method is called, not
    /// when the returned future is first polled. The future resolves with
    /// the operation's own result.
    ///
    /// # Errors
    /// Returns `SyncError::SyncingDisabled` (without running the operation)
    /// when syncing is switched off, `SyncError::RuntimeUnavailable` when
    /// called outside a Tokio runtime, `SyncError::Aborted` if the operation
    /// panicked, and otherwise whatever the operation itself returned.
    pub fn enqueue<T, F, Fut>(
        &self,
        label: impl Into<String>,
        operation: F,
    ) -> impl Future<Output = SyncResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let registered = self.register(label.into(), operation);
        async move {
            let handle = registered?;
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Aborted(e.to_string())),
            }
        }
    }

    fn register<T, F, Fut>(&self, label: String, operation: F) -> SyncResult<JoinHandle<SyncResult<T>>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        if self.inner.flags.syncing_disabled() {
            tracing::debug!("Skipping '{}': syncing disabled", label);
            return Err(SyncError::SyncingDisabled);
        }

        let runtime = Handle::try_current().map_err(|_| SyncError::RuntimeUnavailable)?;

        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.inner.tail.lock().replace(done_rx);
        let inner = self.inner.clone();

        tracing::debug!("Queued '{}'", label);
        Ok(runtime.spawn(async move {
            if let Some(previous) = previous {
                // A dropped sender means the previous body ended abnormally; still our turn.
                let _ = previous.await;
            }

            inner.begin(&label);
            let _guard = RunningGuard {
                inner: inner.clone(),
                done: Some(done_tx),
            };

            tracing::debug!("Running '{}'", label);
            let result = operation().await;
            if let Err(e) = &result {
                tracing::debug!("'{}' failed: {}", label, e);
            }
            result
        }))
    }
}

impl Default for SerialOperationQueue {
    fn default() -> Self {
        Self::new(SyncFlags::global())
    }
}
