// src/error.rs

//! Error types for the installer
//!
//! Every failure the migration can hit is a variant of [`Error`]. Each variant
//! belongs to one [`ErrorKind`] and renders a short console code via
//! [`Error::code`], which is what the fatal-error screen shows.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive could not be decoded or lacks required content
    Decode,
    /// The content subsystem returned an error status
    ContentIo,
    /// The privileged title store returned an error status
    StoreIo,
    /// Writing to external storage failed
    Filesystem,
    /// No removable media could be mounted
    MediaUnavailable,
    /// An operation was invoked in the wrong migration state
    State,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::ContentIo => write!(f, "content-io"),
            Self::StoreIo => write!(f, "store-io"),
            Self::Filesystem => write!(f, "filesystem"),
            Self::MediaUnavailable => write!(f, "media-unavailable"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Installer errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to init zip reader: {0}")]
    Decode(String),

    #[error("Archive contains no primary executable named {0}")]
    MissingExecutable(String),

    #[error("Failed to {op} content {index} (status {status})")]
    ContentIo {
        op: &'static str,
        index: u32,
        status: i32,
    },

    #[error("Failed to get current title id (status {0})")]
    TitleId(i32),

    #[error("Failed to {op} {key} (status {status})")]
    StoreIo {
        op: &'static str,
        key: String,
        status: i32,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("Failed to extract {entry} to {path}: {reason}")]
    Extract {
        entry: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Please insert either an SD Card or USB ({0})")]
    MediaUnavailable(String),

    #[error("Migration cannot run from state {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::MissingExecutable(_) => ErrorKind::Decode,
            Self::ContentIo { .. } | Self::TitleId(_) => ErrorKind::ContentIo,
            Self::StoreIo { .. } => ErrorKind::StoreIo,
            Self::CreateDirectory { .. }
            | Self::Extract { .. }
            | Self::PathTraversal(_)
            | Self::InvalidPath(_)
            | Self::Io(_) => ErrorKind::Filesystem,
            Self::MediaUnavailable(_) => ErrorKind::MediaUnavailable,
            Self::InvalidState(_) => ErrorKind::State,
        }
    }

    /// Short code shown on the fatal-error screen
    ///
    /// Subsystem failures show the raw negative status they returned; local
    /// failures show a fixed mnemonic.
    pub fn code(&self) -> String {
        match self {
            Self::Decode(_) => "ZIP_INIT_FAIL".to_string(),
            Self::MissingExecutable(_) => "NO_PRIMARY_EXECUTABLE".to_string(),
            Self::ContentIo { status, .. } | Self::StoreIo { status, .. } => status.to_string(),
            Self::TitleId(status) => status.to_string(),
            Self::CreateDirectory { .. } => "DIR_CREATE_FAIL".to_string(),
            Self::Extract { .. } => "ZIP_EXTRACT_FAIL".to_string(),
            Self::PathTraversal(_) | Self::InvalidPath(_) => "BAD_ENTRY_PATH".to_string(),
            Self::MediaUnavailable(_) => "NO_MEDIA".to_string(),
            Self::InvalidState(_) => "BAD_STATE".to_string(),
            Self::Io(_) => "IO_ERROR".to_string(),
        }
    }
}
