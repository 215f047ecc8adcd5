//! Remote store kept in a plain directory.
//!
//! Layout of a remote directory:
//!
//! ```text
//! <remote>/
//! ├─ 2024-03-01.csv    # One transfer unit per day
//! ├─ 2024-03-02.csv
//! └─ settings.json     # Settings document (optional)
//! ```
//!
//! Pointing this at a folder kept in sync by a file-sharing service turns
//! that folder into the shared remote for several devices.

use crate::local::write_atomic;
use ledgersync_engine::{RemoteStore, SyncError, SyncResult};
use ledgersync_protocol::{
    day_key_from_filename, decode_day, encode_day, filename_for_day, DayKey, Record, Settings,
};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SETTINGS_FILE: &str = "settings.json";

/// A [`RemoteStore`] over a directory of CSV day units.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    /// Uses `root` as the remote. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn io_failure(&self, action: &str, path: &Path, e: io::Error) -> SyncError {
        let message = format!("{action} {}: {e}", path.display());
        match e.kind() {
            ErrorKind::PermissionDenied => SyncError::AuthenticationFailed(message),
            ErrorKind::NotFound
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock => SyncError::remote_retryable(message),
            _ => SyncError::remote_fatal(message),
        }
    }
}

impl RemoteStore for DirectoryRemote {
    fn fetch_records(&self) -> SyncResult<Vec<Record>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(remote = %self.root.display(), "remote directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_failure("list", &self.root, e)),
        };

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_failure("list", &self.root, e))?;
            let name = entry.file_name();
            let Some(day) = name.to_str().and_then(day_key_from_filename) else {
                continue;
            };
            units.push((day, entry.path()));
        }
        units.sort();

        let mut records = Vec::new();
        for (day, path) in units {
            let bytes = fs::read(&path).map_err(|e| self.io_failure("read", &path, e))?;
            let unit = decode_day(&bytes)?;
            for record in &unit {
                if DayKey::of(record) != day {
                    warn!(id = %record.id, file = %path.display(), "record filed under another day");
                }
            }
            records.extend(unit);
        }
        Ok(records)
    }

    fn fetch_settings(&self) -> SyncResult<Option<Settings>> {
        let path = self.root.join(SETTINGS_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SyncError::Validation(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_failure("read", &path, e)),
        }
    }

    fn write_day(&self, day: DayKey, records: &[Record]) -> SyncResult<()> {
        let path = self.root.join(filename_for_day(day));

        if records.is_empty() {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_failure("remove", &path, e)),
            };
        }

        fs::create_dir_all(&self.root).map_err(|e| self.io_failure("create", &self.root, e))?;
        let bytes = encode_day(records)?;
        write_atomic(&path, &bytes).map_err(|e| self.io_failure("write", &path, e))
    }

    fn write_settings(&self, settings: &Settings) -> SyncResult<()> {
        let path = self.root.join(SETTINGS_FILE);
        fs::create_dir_all(&self.root).map_err(|e| self.io_failure("create", &self.root, e))?;
        let bytes = serde_json::to_vec_pretty(settings)
            .map_err(|e| SyncError::Validation(format!("{}: {e}", path.display())))?;
        write_atomic(&path, &bytes).map_err(|e| self.io_failure("write", &path, e))
    }
}
