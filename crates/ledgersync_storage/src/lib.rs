//! # LedgerSync Storage
//!
//! Durable keyed document storage for LedgerSync.
//!
//! Storage backends are **opaque document stores**: each key maps to one
//! blob of bytes that is replaced wholesale on write. Backends do not
//! interpret what they store; the sync queue decides the document format.
//!
//! ## Design Principles
//!
//! - A write either replaces the whole document or leaves the old one intact
//! - Keys are flat names (`[A-Za-z0-9._-]`), never paths
//! - Must be `Send + Sync` so a single owner can live behind a lock
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral state
//! - [`FileBackend`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use ledgersync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write("sync-queue", b"{}").unwrap();
//! assert_eq!(backend.read("sync-queue").unwrap().as_deref(), Some(&b"{}"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
