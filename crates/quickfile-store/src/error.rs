// crates/quickfile-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Error taxonomy for the chunked blob store.
// Purpose: Classify validation, quota, lookup, and storage failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! All store operations return [`FileStoreError`]. Payloads are plain strings
//! so errors stay `Clone` and never embed raw file bytes.

use thiserror::Error;

/// Chunked blob store errors.
///
/// # Invariants
/// - Error messages never embed stored file contents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    /// Unknown file identifier.
    #[error("file not found: {0}")]
    NotFound(String),
    /// Upload request failed validation.
    #[error("invalid upload: {0}")]
    Invalid(String),
    /// Account or system quota exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Store I/O error (filesystem or input stream).
    #[error("file store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("file store db error: {0}")]
    Db(String),
    /// Stored schema version does not match this build.
    #[error("file store version mismatch: {0}")]
    VersionMismatch(String),
}

impl FileStoreError {
    /// Returns true when the process must not continue using the store.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::VersionMismatch(_))
    }
}
