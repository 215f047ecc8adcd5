//! Durable sync queue.

use crate::error::SyncResult;
use chrono::Utc;
use ledgersync_protocol::{SyncOpInput, SyncQueueOp, SyncQueueState};
use ledgersync_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Storage key of the queue document.
pub const SYNC_QUEUE_KEY: &str = "sync-queue";

/// Durable, append-only log of local mutations not yet pushed.
///
/// Every operation runs load → mutate → persist while holding the backend
/// mutex, so concurrent callers observe a total order and never interleave
/// their writes. A document that fails to decode is treated as an empty
/// queue; new mutations always succeed against it.
pub struct SyncQueue<B: StorageBackend> {
    backend: Mutex<B>,
    key: String,
}

impl<B: StorageBackend> SyncQueue<B> {
    /// Creates a queue stored under [`SYNC_QUEUE_KEY`].
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, SYNC_QUEUE_KEY)
    }

    /// Creates a queue stored under a custom key.
    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend: Mutex::new(backend),
            key: key.into(),
        }
    }

    /// Appends an operation and persists the queue.
    pub fn enqueue(&self, input: SyncOpInput) -> SyncResult<SyncQueueOp> {
        let mut backend = self.backend.lock();
        let mut state = self.load(&*backend)?;
        let op = state.enqueue(input, Utc::now());
        self.store(&mut *backend, &state)?;
        debug!(
            component = "sync_queue",
            operation = "enqueue",
            op_id = op.id,
            kind = op.payload.kind(),
            "queued operation"
        );
        Ok(op)
    }

    /// Returns the last assigned op id.
    pub fn watermark(&self) -> SyncResult<u64> {
        let backend = self.backend.lock();
        Ok(self.load(&*backend)?.watermark())
    }

    /// Returns ops with an id above `watermark`, ascending.
    pub fn ops_since(&self, watermark: u64) -> SyncResult<Vec<SyncQueueOp>> {
        let backend = self.backend.lock();
        Ok(self.load(&*backend)?.ops_since(watermark))
    }

    /// Removes ops up to and including `watermark`. Returns how many went.
    pub fn clear_up_to(&self, watermark: u64) -> SyncResult<usize> {
        let mut backend = self.backend.lock();
        let mut state = self.load(&*backend)?;
        let removed = state.clear_up_to(watermark);
        if removed > 0 {
            self.store(&mut *backend, &state)?;
        }
        debug!(
            component = "sync_queue",
            operation = "clear",
            watermark,
            removed,
            "cleared synchronized operations"
        );
        Ok(removed)
    }

    /// Returns a snapshot of the whole queue document.
    pub fn state(&self) -> SyncResult<SyncQueueState> {
        let backend = self.backend.lock();
        self.load(&*backend)
    }

    fn load(&self, backend: &B) -> SyncResult<SyncQueueState> {
        let Some(bytes) = backend.read(&self.key)? else {
            return Ok(SyncQueueState::empty());
        };

        match SyncQueueState::from_json(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    component = "sync_queue",
                    operation = "load",
                    error = %e,
                    "discarding unreadable queue document"
                );
                Ok(SyncQueueState::empty())
            }
        }
    }

    fn store(&self, backend: &mut B, state: &SyncQueueState) -> SyncResult<()> {
        let bytes = state.to_json()?;
        backend.write(&self.key, &bytes)?;
        Ok(())
    }
}
