//! Remote store abstraction.

use crate::error::{SyncError, SyncResult};
use ledgersync_protocol::{decode_day, encode_day, group_by_day, DayKey, Record, Settings};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The authoritative remote copy of the ledger.
///
/// Records are stored as one transfer unit per calendar day. Writing a day
/// replaces that whole unit; an empty slice removes it. Implementations
/// decide how units are addressed (files in a folder, objects in a bucket).
pub trait RemoteStore: Send + Sync {
    /// Fetches every record from every day unit.
    fn fetch_records(&self) -> SyncResult<Vec<Record>>;

    /// Fetches the settings document, if one has been written.
    fn fetch_settings(&self) -> SyncResult<Option<Settings>>;

    /// Replaces the unit for `day` with `records`.
    fn write_day(&self, day: DayKey, records: &[Record]) -> SyncResult<()>;

    /// Replaces the settings document.
    fn write_settings(&self, settings: &Settings) -> SyncResult<()>;
}

/// An in-memory remote store for testing.
///
/// Day units are kept CSV-encoded, exactly as a file-based remote would
/// hold them. Failures can be injected per direction.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    days: Mutex<BTreeMap<DayKey, Vec<u8>>>,
    settings: Mutex<Option<Vec<u8>>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    writes_before_failure: Mutex<Option<usize>>,
    fetch_count: AtomicUsize,
    written_days: Mutex<Vec<DayKey>>,
    settings_writes: AtomicUsize,
}

impl MemoryRemote {
    /// Creates an empty, reachable remote.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Creates a remote already holding `records`.
    pub fn with_records(records: &[Record]) -> SyncResult<Self> {
        let remote = Self::new();
        {
            let mut days = remote.days.lock();
            for (day, bucket) in group_by_day(records) {
                days.insert(day, encode_day(&bucket)?);
            }
        }
        Ok(remote)
    }

    /// Sets the reachable state. An unreachable remote fails every call
    /// with a retryable error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every write fail. `false` lets writes succeed again and drops
    /// any budget set by [`fail_writes_after`](Self::fail_writes_after).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            *self.writes_before_failure.lock() = None;
        }
    }

    /// Lets `count` more writes succeed, then fails the rest.
    pub fn fail_writes_after(&self, count: usize) {
        *self.writes_before_failure.lock() = Some(count);
    }

    /// Returns how many fetches were attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Returns every day written so far, in write order.
    pub fn written_days(&self) -> Vec<DayKey> {
        self.written_days.lock().clone()
    }

    /// Returns how many times settings were written.
    pub fn settings_writes(&self) -> usize {
        self.settings_writes.load(Ordering::SeqCst)
    }

    /// Returns the raw unit stored for `day`.
    pub fn raw_day(&self, day: DayKey) -> Option<Vec<u8>> {
        self.days.lock().get(&day).cloned()
    }

    /// Returns the days that currently hold a unit.
    pub fn days(&self) -> Vec<DayKey> {
        self.days.lock().keys().copied().collect()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::remote_retryable("connection refused: remote unreachable"))
        }
    }

    fn check_writable(&self) -> SyncResult<()> {
        self.check_connected()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::remote_retryable("write rejected: network timeout"));
        }
        let mut budget = self.writes_before_failure.lock();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(SyncError::remote_retryable("write rejected: network timeout"));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    fn fetch_records(&self) -> SyncResult<Vec<Record>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;

        let days = self.days.lock();
        let mut records = Vec::new();
        for unit in days.values() {
            records.extend(decode_day(unit)?);
        }
        Ok(records)
    }

    fn fetch_settings(&self) -> SyncResult<Option<Settings>> {
        self.check_connected()?;
        match self.settings.lock().as_deref() {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| SyncError::Validation(format!("settings document: {e}"))),
            None => Ok(None),
        }
    }

    fn write_day(&self, day: DayKey, records: &[Record]) -> SyncResult<()> {
        self.check_writable()?;

        let mut days = self.days.lock();
        if records.is_empty() {
            days.remove(&day);
        } else {
            days.insert(day, encode_day(records)?);
        }
        self.written_days.lock().push(day);
        Ok(())
    }

    fn write_settings(&self, settings: &Settings) -> SyncResult<()> {
        self.check_writable()?;

        let bytes = serde_json::to_vec(settings)
            .map_err(|e| SyncError::Validation(format!("settings document: {e}")))?;
        *self.settings.lock() = Some(bytes);
        self.settings_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
