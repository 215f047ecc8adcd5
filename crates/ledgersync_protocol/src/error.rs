//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol data.
///
/// The merge engine and replay functions never fail; only ingestion of
/// external data (CSV transfer units, JSON documents) does.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The CSV layer failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is missing from a transfer unit header.
    #[error("missing column {0:?}")]
    MissingColumn(&'static str),

    /// A field could not be parsed.
    #[error("row {row}, column {column}: {message}")]
    InvalidField {
        /// 1-based data row number (header excluded).
        row: usize,
        /// Column name.
        column: &'static str,
        /// What was wrong.
        message: String,
    },

    /// A transfer unit could not be written.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl ProtocolError {
    pub(crate) fn invalid_field(row: usize, column: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            row,
            column,
            message: message.into(),
        }
    }
}

/// Why a persisted queue document was rejected.
#[derive(Debug, Error)]
pub enum QueueDecodeError {
    /// The document is not valid JSON or does not match the queue shape.
    #[error("malformed queue document: {0}")]
    Malformed(String),

    /// The document was written by a different schema version.
    #[error("queue schema version mismatch: found {found:?}, expected {expected}")]
    VersionMismatch {
        /// Version found in the document (if any).
        found: Option<u64>,
        /// Version this build understands.
        expected: u32,
    },
}
