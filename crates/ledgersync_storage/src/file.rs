//! File-based storage backend for persistent storage.
//!
//! Layout of a storage directory:
//!
//! ```text
//! <dir>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ <key>             # One file per document
//! └─ <key>.tmp         # Transient, only during a write
//! ```

use crate::backend::{validate_key, StorageBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TEMP_SUFFIX: &str = ".tmp";

/// A directory-backed document store.
///
/// Each document lives in its own file. Writes go to a temporary file that
/// is synced and then renamed over the old document, so a crash mid-write
/// leaves the previous version intact.
///
/// # Thread Safety
///
/// The backend holds an exclusive advisory lock on its directory for its
/// whole lifetime. A second `open` of the same directory, from this or any
/// other process, fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use ledgersync_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("queue")).unwrap();
/// backend.write("sync-queue", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a storage directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another handle holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key == LOCK_FILE || key.ends_with(TEMP_SUFFIX) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.path.join(key))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.document_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.document_path(key)?;
        let temp_path = self.path.join(format!("{key}{TEMP_SUFFIX}"));

        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(data)?;
            temp.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        let path = self.document_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == LOCK_FILE || name.ends_with(TEMP_SUFFIX) || validate_key(&name).is_err() {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }
}
