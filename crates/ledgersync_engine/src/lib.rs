//! # LedgerSync Engine
//!
//! Sync queue, fetch-merge-push engine and orchestrator for LedgerSync.
//!
//! This crate provides:
//! - A durable, single-writer sync queue of pending local mutations
//! - The [`RemoteStore`] abstraction over the day-partitioned remote copy
//! - The unified fetch → merge → push operation ([`SyncEngine`])
//! - The orchestrator state machine (idle → syncing → conflict → pushing)
//! - An async handle running the orchestrator on a tokio task
//! - Retry with exponential backoff
//!
//! ## Architecture
//!
//! There is no sync server. The remote store is a folder of per-day
//! transfer units, and every device reconciles against it like a
//! version-control client:
//! 1. Fetch the remote records and settings
//! 2. Merge them with the local records
//! 3. Pause for the user if edits are too close in time to order
//! 4. Replay queued local mutations onto the merged baseline
//! 5. Write back only the day units that changed
//! 6. Clear the queue up to the watermark captured in step 1
//!
//! ## Key Invariants
//!
//! - Nothing is written unless the fetch in the same attempt succeeded
//! - The queue is cleared only after every write succeeded
//! - Ops enqueued during an attempt survive it
//! - Records are never physically removed; deletion is a soft delete

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod actor;
mod config;
mod engine;
mod error;
mod notice;
mod queue;
mod state;
mod transport;

pub use actor::OrchestratorHandle;
pub use config::{RetryConfig, SyncConfig};
pub use engine::{SyncEngine, SyncOutcome, SyncReport, SyncRequest};
pub use error::{classify_message, ErrorCategory, SyncError, SyncResult};
pub use notice::{RecordingObserver, SyncNotice, SyncObserver};
pub use queue::{SyncQueue, SYNC_QUEUE_KEY};
pub use state::{SessionContext, SyncEvent, SyncOrchestrator, SyncState};
pub use transport::{MemoryRemote, RemoteStore};
