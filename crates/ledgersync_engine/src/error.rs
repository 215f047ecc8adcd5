//! Error types for the sync engine.

use ledgersync_protocol::ProtocolError;
use ledgersync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store could not be read or written.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store rejected our credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Input data was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A transfer unit or document could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A push was attempted while conflicts were still pending.
    #[error("{count} conflict(s) left unresolved")]
    UnresolvedConflicts {
        /// Number of pending conflicts.
        count: usize,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// The orchestrator actor has stopped.
    #[error("sync orchestrator is no longer running")]
    Closed,
}

/// Coarse classification of a failure, used to pick the message a user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The remote could not be reached.
    Network,
    /// Credentials were missing, expired or refused.
    Authentication,
    /// Data was malformed or rejected.
    Validation,
    /// Local persistence failed.
    Storage,
    /// Anything else.
    Unknown,
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Classifies this error.
    ///
    /// Remote errors are opaque strings, so they are classified by keyword
    /// and default to [`ErrorCategory::Network`].
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Remote { message, .. } => match classify_message(message) {
                ErrorCategory::Unknown => ErrorCategory::Network,
                category => category,
            },
            SyncError::AuthenticationFailed(_) => ErrorCategory::Authentication,
            SyncError::Validation(_)
            | SyncError::Protocol(_)
            | SyncError::UnresolvedConflicts { .. } => ErrorCategory::Validation,
            SyncError::Storage(_) => ErrorCategory::Storage,
            SyncError::Timeout => ErrorCategory::Network,
            SyncError::Closed => ErrorCategory::Unknown,
        }
    }

    /// Returns a short sentence suitable for showing to a user.
    pub fn user_message(&self) -> &'static str {
        if let SyncError::UnresolvedConflicts { .. } = self {
            return "Some conflicts are still unresolved. Choose a version for each one and sync again.";
        }
        match self.category() {
            ErrorCategory::Network => {
                "Could not reach the remote store. Check your connection and try again."
            }
            ErrorCategory::Authentication => {
                "Access to the remote store was refused. Please sign in again."
            }
            ErrorCategory::Validation => {
                "Some ledger data could not be read. Review recent changes and try again."
            }
            ErrorCategory::Storage => "Could not save sync data on this device.",
            ErrorCategory::Unknown => "Sync failed. Please try again.",
        }
    }
}

const AUTH_WORDS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "401",
    "403",
    "token",
    "credential",
    "sign in",
    "login",
];
const NETWORK_WORDS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "offline",
    "unreachable",
    "dns",
    "socket",
];
const STORAGE_WORDS: &[&str] = &[
    "storage",
    "disk",
    "quota",
    "no space",
    "read-only",
    "i/o",
];
const VALIDATION_WORDS: &[&str] = &["invalid", "validation", "malformed", "parse", "missing"];

/// Classifies an opaque error message by keyword.
pub fn classify_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| message.contains(w));

    if has(AUTH_WORDS) {
        ErrorCategory::Authentication
    } else if has(NETWORK_WORDS) {
        ErrorCategory::Network
    } else if has(STORAGE_WORDS) {
        ErrorCategory::Storage
    } else if has(VALIDATION_WORDS) {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Unknown
    }
}
