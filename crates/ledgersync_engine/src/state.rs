//! Sync orchestrator state machine.

use crate::engine::{SyncEngine, SyncOutcome, SyncReport, SyncRequest};
use crate::error::SyncError;
use crate::notice::{SyncNotice, SyncObserver};
use crate::transport::RemoteStore;
use ledgersync_protocol::{Resolutions, TrueConflict};
use ledgersync_storage::StorageBackend;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Nothing in progress.
    Idle,
    /// Fetching and merging.
    Syncing,
    /// Waiting for the user to resolve conflicts.
    Conflict,
    /// Re-running the sync with resolutions applied.
    Pushing,
    /// The last attempt found nothing to do.
    InSync,
    /// The last attempt pushed changes.
    Success,
    /// The last attempt failed.
    Error,
}

impl SyncState {
    /// Returns true while an attempt is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing | SyncState::Pushing)
    }

    /// Returns true if a `Sync` event starts a new attempt.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            SyncState::Idle | SyncState::Error | SyncState::Success | SyncState::InSync
        )
    }

    /// Returns true for states that fall back to `Idle` after the display delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncState::Success | SyncState::InSync)
    }
}

/// Input to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Start an attempt with the given local snapshot.
    Sync(SyncRequest),
    /// Resume a paused attempt with per-id choices.
    ResolveConflicts(Resolutions),
    /// Abandon a paused attempt.
    Cancel,
    /// Return to `Idle` from a finished attempt.
    Reset,
}

impl SyncEvent {
    /// Returns the event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Sync(_) => "sync",
            SyncEvent::ResolveConflicts(_) => "resolve_conflicts",
            SyncEvent::Cancel => "cancel",
            SyncEvent::Reset => "reset",
        }
    }
}

/// Everything the orchestrator remembers about the current attempt.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Snapshot taken when the attempt started.
    pub request: Option<SyncRequest>,
    /// Conflicts awaiting resolution.
    pub conflicts: Vec<TrueConflict>,
    /// Report of the last successful push.
    pub report: Option<SyncReport>,
    /// User-facing message of the last failure.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Syncing,
    Pushing,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Syncing => "sync",
            Phase::Pushing => "push",
        }
    }
}

/// Sequences sync attempts and reports their outcome to observers.
///
/// # Transitions
///
/// - `Idle | Error | Success | InSync` + `Sync` → `Syncing`
/// - `Syncing` → `Conflict | InSync | Success | Error`
/// - `Conflict` + `ResolveConflicts` → `Pushing` → `InSync | Success | Error`
/// - `Conflict` + `Cancel` → `Idle`
/// - `Success | InSync` + display delay or `Reset` → `Idle`
/// - `Error` + `Reset` → `Idle`
///
/// Any other event is ignored.
pub struct SyncOrchestrator<R: RemoteStore, B: StorageBackend> {
    engine: Arc<SyncEngine<R, B>>,
    state: SyncState,
    context: SessionContext,
    observers: Vec<Arc<dyn SyncObserver>>,
    display_delay: Duration,
    entered_at: Instant,
}

impl<R: RemoteStore, B: StorageBackend> SyncOrchestrator<R, B> {
    /// Creates an idle orchestrator driving `engine`.
    pub fn new(engine: Arc<SyncEngine<R, B>>) -> Self {
        let display_delay = engine.config().display_delay;
        Self {
            engine,
            state: SyncState::Idle,
            context: SessionContext::default(),
            observers: Vec::new(),
            display_delay,
            entered_at: Instant::now(),
        }
    }

    /// Registers an observer.
    pub fn subscribe(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.push(observer);
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Returns the session context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine<R, B>> {
        &self.engine
    }

    /// Returns when a transient state falls back to `Idle`.
    pub fn display_deadline(&self) -> Option<Instant> {
        self.state
            .is_transient()
            .then(|| self.entered_at + self.display_delay)
    }

    /// Feeds one event and returns the resulting state.
    ///
    /// Engine work runs to completion inside this call.
    pub fn send(&mut self, event: SyncEvent) -> SyncState {
        match (self.state, event) {
            (state, SyncEvent::Sync(request)) if state.can_start_sync() => self.start(request),
            (SyncState::Syncing | SyncState::Pushing, SyncEvent::Sync(request)) => {
                warn!(
                    component = "orchestrator",
                    operation = "sync",
                    "sync requested while running; replacing session input"
                );
                self.context.request = Some(request);
            }
            (SyncState::Conflict, SyncEvent::ResolveConflicts(resolutions)) => {
                self.resume(resolutions)
            }
            (SyncState::Conflict, SyncEvent::Cancel) => {
                info!(
                    component = "orchestrator",
                    operation = "cancel",
                    discarded = self.context.conflicts.len(),
                    "conflict resolution cancelled"
                );
                self.context = SessionContext::default();
                self.set_state(SyncState::Idle);
            }
            (SyncState::Success | SyncState::InSync | SyncState::Error, SyncEvent::Reset) => {
                self.context.error = None;
                self.set_state(SyncState::Idle);
            }
            (state, event) => {
                debug!(
                    component = "orchestrator",
                    state = ?state,
                    event = event.name(),
                    "ignoring event"
                );
            }
        }
        self.state
    }

    /// Returns a transient state to `Idle` once the display delay has passed.
    pub fn tick(&mut self, now: Instant) -> SyncState {
        if let Some(deadline) = self.display_deadline() {
            if now >= deadline {
                self.set_state(SyncState::Idle);
            }
        }
        self.state
    }

    fn start(&mut self, request: SyncRequest) {
        self.context = SessionContext {
            request: Some(request),
            ..SessionContext::default()
        };
        self.set_state(SyncState::Syncing);
        self.run(Phase::Syncing);
    }

    fn resume(&mut self, resolutions: Resolutions) {
        let Some(request) = self.context.request.as_mut() else {
            warn!(component = "orchestrator", operation = "push", "no session to resume");
            self.set_state(SyncState::Idle);
            return;
        };
        request.resolutions.extend(resolutions);
        self.context.conflicts.clear();
        self.set_state(SyncState::Pushing);
        self.run(Phase::Pushing);
    }

    fn run(&mut self, phase: Phase) {
        let request = self.context.request.clone().unwrap_or_default();

        match self.engine.sync_with_retry(&request) {
            Ok(SyncOutcome::Conflicts(conflicts)) => match phase {
                Phase::Syncing => {
                    self.context.conflicts = conflicts.clone();
                    self.set_state(SyncState::Conflict);
                    self.emit(SyncNotice::Conflict(conflicts));
                }
                Phase::Pushing => self.fail(
                    phase,
                    SyncError::UnresolvedConflicts {
                        count: conflicts.len(),
                    },
                ),
            },
            Ok(SyncOutcome::InSync) => {
                self.set_state(SyncState::InSync);
                self.emit(SyncNotice::InSync);
            }
            Ok(SyncOutcome::Synced(report)) => {
                self.context.report = Some(report.clone());
                self.set_state(SyncState::Success);
                self.emit(SyncNotice::Success(report));
            }
            Err(e) => self.fail(phase, e),
        }
    }

    fn fail(&mut self, phase: Phase, error: SyncError) {
        error!(
            component = "orchestrator",
            operation = phase.name(),
            category = ?error.category(),
            error = %error,
            "sync failed"
        );
        let message = error.user_message().to_string();
        self.context.error = Some(message.clone());
        self.set_state(SyncState::Error);
        self.emit(SyncNotice::Error(message));
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            debug!(component = "orchestrator", from = ?self.state, to = ?state, "state change");
        }
        self.state = state;
        self.entered_at = Instant::now();
    }

    fn emit(&self, notice: SyncNotice) {
        for observer in &self.observers {
            observer.notify(&notice);
        }
    }
}
