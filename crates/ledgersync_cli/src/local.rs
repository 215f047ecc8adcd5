//! Local ledger files.
//!
//! Layout of a data directory:
//!
//! ```text
//! <data>/
//! ├─ ledger.json       # Every local record, soft-deleted ones included
//! ├─ settings.json     # Local settings (optional)
//! └─ queue/            # Sync queue storage (locked while open)
//! ```

use ledgersync_engine::SyncQueue;
use ledgersync_protocol::{decode_day, sort_newest_first, ProtocolError, Record, Settings};
use ledgersync_storage::{FileBackend, StorageError};
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LEDGER_FILE: &str = "ledger.json";
const SETTINGS_FILE: &str = "settings.json";
const QUEUE_DIR: &str = "queue";

/// Errors reading or writing local ledger files.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error occurred.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A JSON document could not be read or written.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A CSV transfer unit could not be decoded.
    #[error("invalid transfer unit {path}: {source}")]
    Csv {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: ProtocolError,
    },

    /// The queue storage could not be opened.
    #[error("queue storage: {0}")]
    Storage(#[from] StorageError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

/// Reads a record file: a CSV transfer unit when the extension is `csv`,
/// otherwise a JSON array of records.
pub fn read_record_file(path: &Path) -> Result<Vec<Record>, LedgerError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        decode_day(&bytes).map_err(|source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_slice(&bytes).map_err(|source| LedgerError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A local data directory.
#[derive(Debug, Clone)]
pub struct LocalLedger {
    dir: PathBuf,
}

impl LocalLedger {
    /// Opens a data directory, creating it if needed.
    pub fn open(dir: &Path) -> Result<Self, LedgerError> {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Loads every local record. A missing ledger is empty.
    pub fn records(&self) -> Result<Vec<Record>, LedgerError> {
        let path = self.dir.join(LEDGER_FILE);
        match fs::metadata(&path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(&path)(e)),
            Ok(_) => read_record_file(&path),
        }
    }

    /// Replaces the local records.
    pub fn save_records(&self, records: &[Record]) -> Result<(), LedgerError> {
        let mut records = records.to_vec();
        sort_newest_first(&mut records);
        let path = self.dir.join(LEDGER_FILE);
        let bytes = serde_json::to_vec_pretty(&records).map_err(|source| LedgerError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes).map_err(io_error(&path))
    }

    /// Inserts or replaces one record by id.
    pub fn upsert(&self, record: Record) -> Result<(), LedgerError> {
        let mut records = self.records()?;
        records.retain(|r| r.id != record.id);
        records.push(record);
        self.save_records(&records)
    }

    /// Loads local settings, if any were saved.
    pub fn settings(&self) -> Result<Option<Settings>, LedgerError> {
        let path = self.dir.join(SETTINGS_FILE);
        match fs::read(&path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| LedgerError::Json { path, source }),
        }
    }

    /// Replaces local settings.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), LedgerError> {
        let path = self.dir.join(SETTINGS_FILE);
        let bytes = serde_json::to_vec_pretty(settings).map_err(|source| LedgerError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes).map_err(io_error(&path))
    }

    /// Opens the sync queue. Fails with [`StorageError::Locked`] while
    /// another process holds it.
    pub fn queue(&self) -> Result<SyncQueue<FileBackend>, LedgerError> {
        let backend = FileBackend::open(&self.dir.join(QUEUE_DIR))?;
        Ok(SyncQueue::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn record(id: &str) -> Record {
        Record::new(
            id,
            Decimal::new(1050, 2),
            "Food",
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocalLedger::open(dir.path()).unwrap();

        assert!(ledger.records().unwrap().is_empty());
        assert!(ledger.settings().unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocalLedger::open(dir.path()).unwrap();

        ledger.upsert(record("a")).unwrap();
        ledger.upsert(record("b")).unwrap();
        ledger.upsert(record("a").with_note("edited")).unwrap();

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records.iter().find(|r| r.id == "a").unwrap().note,
            "edited"
        );
    }

    #[test]
    fn settings_persist() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocalLedger::open(dir.path()).unwrap();

        ledger.save_settings(&Settings::default()).unwrap();
        assert_eq!(ledger.settings().unwrap(), Some(Settings::default()));
    }

    #[test]
    fn csv_files_are_read_as_transfer_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-04-02.csv");
        fs::write(
            &path,
            "id,amount,category,date,createdAt\nx,3,Food,2024-04-02,2024-04-02T10:00:00Z\n",
        )
        .unwrap();

        let records = read_record_file(&path).unwrap();
        assert_eq!(records[0].id, "x");
    }

    #[test]
    fn queue_is_single_owner() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocalLedger::open(dir.path()).unwrap();

        let _queue = ledger.queue().unwrap();
        assert!(matches!(
            ledger.queue(),
            Err(LedgerError::Storage(StorageError::Locked))
        ));
    }
}
