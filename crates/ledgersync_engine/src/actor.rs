//! Async handle running the orchestrator on a tokio task.

use crate::error::{SyncError, SyncResult};
use crate::notice::{SyncNotice, SyncObserver};
use crate::state::{SyncEvent, SyncOrchestrator, SyncState};
use crate::transport::RemoteStore;
use ledgersync_storage::StorageBackend;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

const EVENT_CAPACITY: usize = 32;
const NOTICE_CAPACITY: usize = 64;

struct BroadcastObserver(broadcast::Sender<SyncNotice>);

impl SyncObserver for BroadcastObserver {
    fn notify(&self, notice: &SyncNotice) {
        // No subscribers is not an error.
        let _ = self.0.send(notice.clone());
    }
}

/// Handle to an orchestrator running on its own task.
///
/// Events are processed strictly in the order they are sent. Engine work
/// runs on the blocking pool, so a UI thread posting events never waits on
/// the remote store.
pub struct OrchestratorHandle {
    events: mpsc::Sender<SyncEvent>,
    notices: broadcast::Sender<SyncNotice>,
    state: Arc<RwLock<SyncState>>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Moves `orchestrator` onto a new task. Must be called within a tokio
    /// runtime.
    pub fn spawn<R, B>(mut orchestrator: SyncOrchestrator<R, B>) -> Self
    where
        R: RemoteStore + 'static,
        B: StorageBackend + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        orchestrator.subscribe(Arc::new(BroadcastObserver(notices_tx.clone())));

        let state = Arc::new(RwLock::new(orchestrator.state()));
        let task = tokio::spawn(run(orchestrator, events_rx, Arc::clone(&state)));

        Self {
            events: events_tx,
            notices: notices_tx,
            state,
            task,
        }
    }

    /// Queues an event.
    pub async fn send(&self, event: SyncEvent) -> SyncResult<()> {
        self.events.send(event).await.map_err(|_| SyncError::Closed)
    }

    /// Subscribes to notices emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Returns the state after the last processed event.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Stops accepting events and waits for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.events);
        if let Err(e) = self.task.await {
            error!(component = "orchestrator", operation = "shutdown", error = %e, "actor task failed");
        }
    }
}

async fn run<R, B>(
    mut orchestrator: SyncOrchestrator<R, B>,
    mut events: mpsc::Receiver<SyncEvent>,
    state: Arc<RwLock<SyncState>>,
) where
    R: RemoteStore + 'static,
    B: StorageBackend + 'static,
{
    loop {
        let event = match orchestrator.display_deadline() {
            Some(deadline) => {
                tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        *state.write() = orchestrator.tick(Instant::now());
                        continue;
                    }
                }
            }
            None => events.recv().await,
        };

        let Some(event) = event else {
            debug!(component = "orchestrator", "event channel closed");
            break;
        };

        *state.write() = match (&event, orchestrator.state()) {
            (SyncEvent::Sync(_), current) if current.can_start_sync() => SyncState::Syncing,
            (SyncEvent::ResolveConflicts(_), SyncState::Conflict) => SyncState::Pushing,
            (_, current) => current,
        };

        let joined = tokio::task::spawn_blocking(move || {
            orchestrator.send(event);
            orchestrator
        })
        .await;

        match joined {
            Ok(back) => orchestrator = back,
            Err(e) => {
                error!(component = "orchestrator", error = %e, "orchestrator task panicked");
                break;
            }
        }
        *state.write() = orchestrator.state();
    }
}
