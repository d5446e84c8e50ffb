//! Error types for Playlist Downloader core operations.
//!
//! Errors are grouped per domain (file system, snapshots, downloader process)
//! and wrapped by the top-level [`Error`]. Every error maps to an
//! [`ErrorKind`] so front-ends can decide how to present it without matching
//! on the full variant tree.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File system access failed.
    FileSystem,
    /// A snapshot is missing, corrupt or invalid.
    Snapshot,
    /// The external downloader could not be run.
    Downloader,
    /// Invalid configuration or user input.
    Configuration,
    /// Serialization or deserialization failed.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileSystem => "filesystem",
            Self::Snapshot => "snapshot",
            Self::Downloader => "downloader",
            Self::Configuration => "configuration",
            Self::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// File system errors with the path that caused them.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Reading a file or directory failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Deleting a file failed.
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed {
        /// Path that could not be deleted.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// Snapshot store errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot file exists for the id.
    #[error("Snapshot not found: {id}")]
    NotFound {
        /// Snapshot id.
        id: String,
    },

    /// The snapshot file exists but is not valid snapshot JSON.
    #[error("Snapshot {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the corrupt file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A string is not a valid snapshot id.
    #[error("Invalid snapshot id '{id}': {reason}")]
    InvalidId {
        /// Rejected input.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An id prefix matches more than one snapshot.
    #[error("Snapshot id prefix '{prefix}' is ambiguous ({matches} matches)")]
    AmbiguousId {
        /// Prefix given by the user.
        prefix: String,
        /// Number of matching snapshots.
        matches: usize,
    },
}

/// Errors raised while starting or driving the external downloader.
#[derive(Debug, Error)]
pub enum DownloaderError {
    /// The downloader executable does not exist on this system.
    #[error("Downloader executable '{program}' was not found; is it installed and on PATH?")]
    BinaryNotFound {
        /// Program that was looked up.
        program: String,
    },

    /// The process could not be spawned for another reason.
    #[error("Failed to start '{program}': {reason}")]
    SpawnFailed {
        /// Program that failed to start.
        program: String,
        /// Underlying reason.
        reason: String,
    },

    /// Reading the process output or waiting for it failed.
    #[error("Lost contact with '{program}': {reason}")]
    StreamFailed {
        /// Program being driven.
        program: String,
        /// Underlying reason.
        reason: String,
    },
}

/// Errors that can occur in Playlist Downloader core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Snapshot store error.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// External downloader error.
    #[error(transparent)]
    Downloader(#[from] DownloaderError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Config could not be serialized.
    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Shorthand for a snapshot-not-found error.
    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::Snapshot(SnapshotError::NotFound { id: id.into() })
    }

    /// Error category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::FileSystem(_) | Self::Io(_) => ErrorKind::FileSystem,
            Self::Snapshot(_) => ErrorKind::Snapshot,
            Self::Downloader(_) => ErrorKind::Downloader,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Serialization(_) | Self::TomlDe(_) | Self::TomlSer(_) => {
                ErrorKind::Serialization
            }
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only transient stream failures qualify; a missing binary or a corrupt
    /// snapshot stays broken until the user acts.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Downloader(DownloaderError::StreamFailed { .. }) | Self::Io(_)
        )
    }
}
