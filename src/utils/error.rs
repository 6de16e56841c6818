use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoUtilsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Archive is already open: {path}")]
    ArchiveInUse { path: PathBuf },

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read from {url} (HTTP {status}){}", .body.as_deref().map(|b| format!(": {b}")).unwrap_or_default())]
    HttpStatus {
        url: String,
        status: u16,
        body: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IoUtilsError {
    pub(crate) fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        IoUtilsError::NotADirectory { path: path.into() }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        IoUtilsError::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, IoUtilsError>;
