//! Outcome notices emitted by the orchestrator.

use crate::engine::SyncReport;
use ledgersync_protocol::TrueConflict;
use parking_lot::Mutex;

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// A sync paused on conflicts that need a per-id choice.
    Conflict(Vec<TrueConflict>),
    /// Changes were pushed; the report carries the converged ledger.
    Success(SyncReport),
    /// Nothing to do.
    InSync,
    /// The attempt failed; the message is safe to show to a user.
    Error(String),
}

/// Receives orchestrator notices.
pub trait SyncObserver: Send + Sync {
    /// Called once per notice, on the thread driving the orchestrator.
    fn notify(&self, notice: &SyncNotice);
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncNotice) + Send + Sync,
{
    fn notify(&self, notice: &SyncNotice) {
        self(notice)
    }
}

/// An observer that keeps every notice it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notices: Mutex<Vec<SyncNotice>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the notices received so far.
    pub fn notices(&self) -> Vec<SyncNotice> {
        self.notices.lock().clone()
    }

    /// Returns the most recent notice.
    pub fn last(&self) -> Option<SyncNotice> {
        self.notices.lock().last().cloned()
    }

    /// Removes and returns the notices received so far.
    pub fn take(&self) -> Vec<SyncNotice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl SyncObserver for RecordingObserver {
    fn notify(&self, notice: &SyncNotice) {
        self.notices.lock().push(notice.clone());
    }
}
