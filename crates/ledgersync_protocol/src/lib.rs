//! # LedgerSync Protocol
//!
//! Record model and the pure algorithms of the ledger sync engine.
//!
//! This crate provides:
//! - [`Record`] and [`Settings`], the replicated data
//! - The merge engine ([`merge`], [`apply_conflict_resolutions`])
//! - Day partitioning of records into transfer units ([`group_by_day`])
//! - Sync queue operations, queue state, and replay onto a baseline
//! - The per-day CSV transfer unit codec
//!
//! This is a pure crate with no I/O operations. Everything here is
//! deterministic: the same inputs always produce the same outputs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod day;
mod error;
mod merge;
mod operation;
mod oplog;
mod record;
mod replay;
mod settings;
mod transfer;

pub use day::{
    affected_days, changed_days, day_key_from_filename, filename_for_day, group_by_day, DayKey,
};
pub use error::{ProtocolError, ProtocolResult, QueueDecodeError};
pub use merge::{
    apply_conflict_resolutions, merge, AutoResolvedConflict, ConflictReason, MergeOptions,
    MergeResult, MergeSummary, Resolutions, Side, TrueConflict, DEFAULT_CONFLICT_THRESHOLD_MS,
};
pub use operation::{OpPayload, SyncOpInput, SyncQueueOp};
pub use oplog::{SyncQueueState, SYNC_QUEUE_VERSION};
pub use record::{sort_newest_first, PaymentMethod, Record, FALLBACK_CURRENCY};
pub use replay::{apply_to_records, apply_to_settings};
pub use settings::{Category, CategoryPatch, Settings, CATEGORY_COLORS, OTHER_CATEGORY};
pub use transfer::{decode_day, encode_day, TRANSFER_COLUMNS};
