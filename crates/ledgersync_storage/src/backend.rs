//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A keyed document store.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write` for a key
/// - a failed `write` leaves the previous document readable
/// - `remove` of a missing key is not an error
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads the document stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the document stored under `key`.
    ///
    /// After this returns successfully the document survives process
    /// termination (for durable backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the backend is read-only,
    /// or an I/O error occurs.
    fn write(&mut self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the document stored under `key`.
    ///
    /// Returns `true` if a document was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&mut self, key: &str) -> StorageResult<bool>;

    /// Lists all stored keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that `key` is a flat, non-empty document name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty keys, keys starting with a
/// dot, or keys containing anything besides ASCII alphanumerics, `.`, `_`
/// and `-`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
