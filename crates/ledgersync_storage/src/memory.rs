//! In-memory storage backend for testing.

use crate::backend::{validate_key, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    documents: RwLock<BTreeMap<String, Vec<u8>>>,
    read_only: AtomicBool,
}

/// An in-memory storage backend.
///
/// Clones share the same documents, so a test can keep one handle while
/// the sync queue owns another, then inspect or sabotage the stored state.
///
/// # Example
///
/// ```rust
/// use ledgersync_storage::{StorageBackend, InMemoryBackend};
///
/// let probe = InMemoryBackend::new();
/// let mut owned = probe.clone();
/// owned.write("doc", b"data").unwrap();
/// assert_eq!(probe.read("doc").unwrap(), Some(b"data".to_vec()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding one pre-existing document.
    ///
    /// Useful for testing recovery from damaged documents.
    #[must_use]
    pub fn with_document(key: &str, data: Vec<u8>) -> Self {
        let backend = Self::new();
        backend.shared.documents.write().insert(key.to_string(), data);
        backend
    }

    /// Makes every subsequent write and remove fail with
    /// [`StorageError::ReadOnly`] (or succeed again when `false`).
    pub fn set_read_only(&self, read_only: bool) {
        self.shared.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.documents.read().len()
    }

    /// Returns true if no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.documents.read().is_empty()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.shared.read_only.load(Ordering::SeqCst) {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.shared.documents.read().get(key).cloned())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.shared
            .documents
            .write()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.check_writable()?;
        Ok(self.shared.documents.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.shared.documents.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty());
        assert_eq!(backend.read("missing").unwrap(), None);
    }

    #[test]
    fn memory_write_replaces_document() {
        let mut backend = InMemoryBackend::new();
        backend.write("doc", b"first").unwrap();
        backend.write("doc", b"second").unwrap();

        assert_eq!(backend.read("doc").unwrap(), Some(b"second".to_vec()));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn memory_clones_share_documents() {
        let probe = InMemoryBackend::new();
        let mut owner = probe.clone();
        owner.write("doc", b"shared").unwrap();

        assert_eq!(probe.read("doc").unwrap(), Some(b"shared".to_vec()));
    }

    #[test]
    fn memory_read_only_rejects_writes_and_keeps_old_data() {
        let mut backend = InMemoryBackend::with_document("doc", b"old".to_vec());
        backend.set_read_only(true);

        assert!(matches!(
            backend.write("doc", b"new"),
            Err(StorageError::ReadOnly)
        ));
        assert!(matches!(backend.remove("doc"), Err(StorageError::ReadOnly)));
        assert_eq!(backend.read("doc").unwrap(), Some(b"old".to_vec()));

        backend.set_read_only(false);
        backend.write("doc", b"new").unwrap();
        assert_eq!(backend.read("doc").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn memory_remove_and_keys() {
        let mut backend = InMemoryBackend::new();
        backend.write("b", b"2").unwrap();
        backend.write("a", b"1").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["a", "b"]);
        assert!(backend.remove("a").unwrap());
        assert!(!backend.remove("a").unwrap());
        assert_eq!(backend.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let mut backend = InMemoryBackend::new();
        assert!(matches!(
            backend.write("../x", b"1"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
