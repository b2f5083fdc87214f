//! Error types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Errors that abort a scan before or instead of producing a result.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid request.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A glob pattern failed to compile.
    #[error("Invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Work was submitted to a limiter that has been closed.
    #[error("Concurrency limiter is closed")]
    LimiterClosed,

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Failure of the external cost function for one file.
#[derive(Debug, Error)]
pub enum CostError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The estimator does not handle this file (binary content, encoding...).
    #[error("Unsupported file {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    /// Any other estimator failure.
    #[error("{message}")]
    Failed { message: String },
}

impl CostError {
    /// Create an I/O cost error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum WarningKind {
    /// A directory could not be listed; its subtree was skipped.
    #[strum(to_string = "unreadable directory")]
    UnreadableDirectory,
    /// A file disappeared or became unreadable after it was listed.
    #[strum(to_string = "vanished")]
    Vanished,
    /// The cost function returned an error.
    #[strum(to_string = "cost failed")]
    CostFailed,
    /// A worker task panicked or was cancelled by the runtime.
    #[strum(to_string = "task failed")]
    TaskFailed,
}

/// Non-fatal problem recorded during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an unreadable directory warning.
    pub fn unreadable_dir(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(
            path,
            format!("Cannot list directory: {error}"),
            WarningKind::UnreadableDirectory,
        )
    }

    /// Create a warning for a file that vanished between listing and processing.
    pub fn vanished(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("File vanished: {error}"), WarningKind::Vanished)
    }

    /// Create a warning from a cost function failure.
    pub fn cost_failed(path: impl Into<PathBuf>, error: &CostError) -> Self {
        Self::new(path, error.to_string(), WarningKind::CostFailed)
    }
}
