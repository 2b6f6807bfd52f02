//! Error types for the civisync engine.
//!
//! Per-file failures (missing file, malformed header, remote rejection) are
//! caught at the batch boundary and turn into skips; workset-level failures
//! (bad directory, corrupt ledger) abort the run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for civisync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    // Network errors
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("remote request failed with status {status}: {url}")]
    Remote { url: String, status: u16 },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid file type: expected .{expected}, got {actual}")]
    InvalidFileType { expected: String, actual: String },

    // Container parsing
    #[error("malformed container header in {}: {reason}", .path.display())]
    MalformedHeader { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Ledger errors
    #[error("processed ledger at {} is corrupt: {message}", .path.display())]
    LedgerCorrupt { path: PathBuf, message: String },

    // Page generation prerequisites
    #[error("missing required artifacts for {file}: {missing:?}")]
    MissingArtifacts { file: String, missing: Vec<PathBuf> },

    // Maintenance passes
    #[error("cleanup failed for {}: {message}", .path.display())]
    CleanupFailure { path: PathBuf, message: String },

    // Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for civisync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

// Conversion implementations for common error types

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error aborts the whole run rather than a single file.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            SyncError::LedgerCorrupt { .. }
                | SyncError::NotADirectory(_)
                | SyncError::Config { .. }
        )
    }
}
