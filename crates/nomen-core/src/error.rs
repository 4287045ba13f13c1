//! Error types for the nomen core
//!
//! Every failure that crosses a component boundary is one of these variants,
//! each carrying a stable machine-readable code that callers dispatch on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during repository and WAV operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record or disk target missing
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// File cannot be parsed as RIFF/WAVE
    #[error("not a valid WAV file: {path}: {reason}")]
    InvalidWav { path: PathBuf, reason: String },

    /// Pre-write hash mismatch (external modification)
    #[error("file changed on disk since it was last read: {0}")]
    FileChanged(PathBuf),

    /// OS reports the file is open exclusively elsewhere
    #[error("file is locked by another process: {0}")]
    FileLocked(PathBuf),

    /// Target path not writable
    #[error("file is read-only: {0}")]
    FileReadOnly(PathBuf),

    /// Target filename already exists
    #[error("rename target already exists: {0}")]
    RenameConflict(PathBuf),

    /// Write failed for out-of-space
    #[error("disk full while writing {0}")]
    DiskFull(PathBuf),

    /// Post-write verification detected a mismatch, or fsync failed
    #[error("write verification failed: {0}")]
    WriteFailed(String),

    /// Supplied metadata fails invariants
    #[error("validation error: {0}")]
    Validation(String),

    /// Analysis requested before the ML subsystem signalled ready
    #[error("classifier model is not ready")]
    ModelNotReady,

    /// The ML subsystem raised
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// Store failure surfaced to the caller (no auto-retry)
    #[error("store error: {0}")]
    Store(#[from] crate::db::DbError),

    /// I/O failure with no more specific classification
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Stable machine-readable code for callers.
    ///
    /// The code set is closed; store failures and I/O errors outside the
    /// classified kinds surface as WRITE_FAILED so callers never see a
    /// code outside the documented eleven.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::FileNotFound(_) => "FILE_NOT_FOUND",
            CoreError::InvalidWav { .. } => "INVALID_WAV",
            CoreError::FileChanged(_) => "FILE_CHANGED",
            CoreError::FileLocked(_) => "FILE_LOCKED",
            CoreError::FileReadOnly(_) => "FILE_READ_ONLY",
            CoreError::RenameConflict(_) => "RENAME_CONFLICT",
            CoreError::DiskFull(_) => "DISK_FULL",
            CoreError::WriteFailed(_) => "WRITE_FAILED",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::ModelNotReady => "MODEL_NOT_READY",
            CoreError::AnalysisFailed(_) => "ANALYSIS_FAILED",
            CoreError::Store(_) => "WRITE_FAILED",
            CoreError::Io { .. } => "WRITE_FAILED",
        }
    }

    /// Classify an I/O error against a path into the closed error set
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => CoreError::FileNotFound(path.display().to_string()),
            ErrorKind::PermissionDenied => CoreError::FileReadOnly(path.to_path_buf()),
            ErrorKind::StorageFull => CoreError::DiskFull(path.to_path_buf()),
            // Windows reports exclusively-opened files as a sharing violation,
            // which std maps to PermissionDenied; Unix advisory locks surface
            // as WouldBlock from try_lock-style APIs.
            ErrorKind::WouldBlock => CoreError::FileLocked(path.to_path_buf()),
            _ => CoreError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
