//! Error and Result types for the file sink.

use {std::io, std::path::PathBuf};

/// A convenience `Result` type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur when building or writing to a file sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("File sink directory must be a non-empty path")]
    EmptyDirectory,
    #[error("File sink name must be a non-empty string")]
    EmptyName,
    #[error("Invalid max size {0} MiB: must be at least 5 MiB (or 0 to disable)")]
    InvalidMaxSize(u64),
    #[error("Invalid compression level {0}: must be between 1 and 9")]
    InvalidCompressionLevel(u32),
    #[error("Failed to create directory '{0}': {1}")]
    CreateDirectoryFailed(PathBuf, String),
    #[error("Failed to create file '{0}': {1}")]
    CreateFileFailed(PathBuf, String),
    #[error("Failed to archive '{from}' to '{to}': {error}")]
    ArchiveFailed { from: PathBuf, to: PathBuf, error: io::Error },
    #[error("File IO error: {0}")]
    FileIOError(#[from] io::Error),
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::FileIOError(err) => err,
            other => io::Error::other(other),
        }
    }
}
