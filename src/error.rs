//! Portable error taxonomy bridging backend errors to archive-engine semantics

use thiserror::Error;

/// Errors surfaced by the archive engine.
///
/// Every kind here corresponds to one row of the error taxonomy table:
/// callers match on these variants rather than on backend-specific errors.
#[derive(Debug, Error)]
pub enum MemoryboxError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous prefix {prefix:?}: {count} matches")]
    Ambiguous { prefix: String, count: usize },

    #[error("already exists: {name}")]
    AlreadyExists {
        name: String,
        /// Existing metafile content, so the caller can decide whether to
        /// surface or ignore (Import suppresses; interactive put surfaces).
        existing_meta: Vec<u8>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupted: {0}")]
    Corrupted(String),

    #[error("cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("transient error (retries exhausted): {0}")]
    Transient(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryboxError>;

impl MemoryboxError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MemoryboxError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, MemoryboxError::AlreadyExists { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MemoryboxError::Cancelled)
    }
}
