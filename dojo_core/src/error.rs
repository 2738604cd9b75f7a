//! Error types for dojo_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using dojo_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or escaping logical path or file name.
    #[error("Invalid path: {reason}")]
    InvalidPath { reason: String },

    /// Sentinel, file, or metadata entry is absent.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Name collision on create or rename.
    #[error("Conflict: {what} already exists")]
    Conflict { what: String },

    /// Sidecar present but unparsable, or contradictory sentinels.
    #[error("Corrupt metadata at {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Fieldless classification of [`Error`], for mapping onto transport statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    Conflict,
    CorruptMetadata,
    StorageFailure,
}

impl Error {
    /// Create an InvalidPath error.
    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Create a Conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict { what: what.into() }
    }

    /// Create a CorruptMetadata error.
    pub fn corrupt_metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while reading `path`.
    ///
    /// A path that vanished under a concurrent delete reports `NotFound`
    /// instead of a storage failure.
    pub fn from_read(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                what: path.into().display().to_string(),
            }
        } else {
            Error::Io { source: err }
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::CorruptMetadata { .. } => ErrorKind::CorruptMetadata,
            Error::Io { .. } => ErrorKind::StorageFailure,
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::invalid_path("x").kind(), ErrorKind::InvalidPath);
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(
            Error::corrupt_metadata("a", "b").kind(),
            ErrorKind::CorruptMetadata
        );
        let io = Error::from(std::io::Error::other("boom"));
        assert_eq!(io.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn test_from_read_maps_missing_to_not_found() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            Error::from_read("media/a.txt", missing).kind(),
            ErrorKind::NotFound
        );

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(
            Error::from_read("media/a.txt", denied).kind(),
            ErrorKind::StorageFailure
        );
    }
}
